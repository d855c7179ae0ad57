use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that abort a bundling run
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("entry file {} does not exist", .0.display())]
    MissingEntryFile(PathBuf),

    #[error("project root {} is not a directory", .0.display())]
    InvalidProjectRoot(PathBuf),

    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to write bundle to {}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type BundleResult<T> = Result<T, BundleError>;
