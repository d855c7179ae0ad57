//! bindle: bundle a multi-file Python project into one self-contained file.
//!
//! [`bundler::Bundler`] is the entry point. It pre-scans the project into an
//! export table, walks the import graph from the entry file on a rayon pool,
//! rewrites and optimizes each internal file once and assembles the
//! contributions behind a single deduplicated import header.

pub mod aggregator;
pub mod assembler;
pub mod ast_builder;
pub mod bundler;
pub mod cache;
pub mod config;
pub mod dependency_graph;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod export_table;
pub mod optimizer;
pub mod reporter;
pub mod resolver;
pub mod rewriter;
pub mod stats;
pub mod stdlib_detection;
pub mod syntax;
pub mod visitors;

pub use bundler::{Bundle, Bundler};
pub use config::Config;
pub use error::{BundleError, BundleResult};
pub use reporter::{LogReporter, Reporter};
pub use stats::BundleSummary;
