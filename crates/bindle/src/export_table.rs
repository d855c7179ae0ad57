//! Project pre-scan
//!
//! Walks every Python file under the project root once, before any bundling
//! task starts, and records:
//!
//! - the [`ExportTable`]: top-level names each file defines, used by the
//!   rewriter to turn `module.name` into `name`;
//! - the [`ReferenceIndex`]: names each file reaches in other files through
//!   attribute access or from-imports, used by dead-code elimination;
//! - the original size of each file for the final statistics;
//! - a fingerprint over all of the above plus the set of Python files present,
//!   which the content cache uses to tell whether a file's cached output can
//!   still be reused.
//!
//! The result is read-only once built.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::{
    cache::to_hex,
    config::Config,
    syntax,
    visitors::{ExportCollector, ImportDiscoveryVisitor, ImportKind, ModuleExports, ReferenceCollector},
};

/// Top-level names defined by each project file
#[derive(Debug, Default, Clone)]
pub struct ExportTable {
    modules: FxHashMap<PathBuf, ModuleExports>,
}

impl ExportTable {
    pub fn insert(&mut self, path: PathBuf, exports: ModuleExports) {
        self.modules.insert(path, exports);
    }

    /// Whether the file at `path` defines `name` at module scope
    pub fn exports(&self, path: &Path, name: &str) -> bool {
        self.modules
            .get(path)
            .is_some_and(|exports| exports.contains(name))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Which files reach a name defined elsewhere
#[derive(Debug, Default, Clone)]
pub struct ReferenceIndex {
    /// name -> files that access it as an attribute or from-import it
    referencing_files: FxHashMap<String, FxHashSet<PathBuf>>,
    /// Some file performs `from x import *`
    has_star_import: bool,
}

impl ReferenceIndex {
    pub fn record(&mut self, name: &str, file: &Path) {
        self.referencing_files
            .entry(name.to_string())
            .or_default()
            .insert(file.to_path_buf());
    }

    pub fn record_star_import(&mut self) {
        self.has_star_import = true;
    }

    pub fn has_star_import(&self) -> bool {
        self.has_star_import
    }

    /// Whether any file other than `defining_file` may use `name`
    pub fn is_referenced_outside(&self, name: &str, defining_file: &Path) -> bool {
        if self.has_star_import {
            return true;
        }
        self.referencing_files
            .get(name)
            .is_some_and(|files| files.iter().any(|file| file != defining_file))
    }
}

/// Everything the pre-scan learns about a project
#[derive(Debug, Default, Clone)]
pub struct ProjectIndex {
    pub exports: ExportTable,
    pub references: ReferenceIndex,
    /// Original size in bytes, keyed by path relative to the project root
    pub file_sizes: IndexMap<PathBuf, usize>,
    /// Hex SHA-256 over the file set, exports and references
    pub fingerprint: String,
}

impl ProjectIndex {
    /// Scan all Python files below `root`, skipping excluded directories
    pub fn scan(root: &Path, config: &Config) -> Self {
        let mut index = Self::default();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded_dir(entry, config));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable directory entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file()
                || entry.path().extension().is_none_or(|ext| ext != "py")
            {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            files.push(relative.to_path_buf());
            index.scan_file(root, entry.path());
        }
        index.fingerprint = index.compute_fingerprint(&files);

        debug!(
            "Pre-scan indexed {} files, {} with parsed exports",
            index.file_sizes.len(),
            index.exports.len()
        );
        index
    }

    /// Digest of everything outside a file that can change its bundled output.
    ///
    /// `files` holds every walked Python file, readable or not, because a new
    /// file can change how an unchanged importer resolves.
    fn compute_fingerprint(&self, files: &[PathBuf]) -> String {
        let mut hasher = Sha256::new();
        for file in files {
            hasher.update(file.to_string_lossy().as_bytes());
            hasher.update([0]);
        }

        let mut modules: Vec<_> = self.exports.modules.iter().collect();
        modules.sort_by(|a, b| a.0.cmp(b.0));
        for (path, exports) in modules {
            hasher.update(path.to_string_lossy().as_bytes());
            for name in &exports.names {
                hasher.update([1]);
                hasher.update(name.as_bytes());
            }
            for name in exports.all.iter().flatten() {
                hasher.update([2]);
                hasher.update(name.as_bytes());
            }
            hasher.update([0]);
        }

        let mut references: Vec<_> = self.references.referencing_files.iter().collect();
        references.sort_by(|a, b| a.0.cmp(b.0));
        for (name, referencing) in references {
            hasher.update(name.as_bytes());
            let mut referencing: Vec<_> = referencing.iter().collect();
            referencing.sort();
            for file in referencing {
                hasher.update([1]);
                hasher.update(file.to_string_lossy().as_bytes());
            }
            hasher.update([0]);
        }
        hasher.update([u8::from(self.references.has_star_import)]);

        to_hex(&hasher.finalize())
    }

    fn scan_file(&mut self, root: &Path, path: &Path) {
        // Read and parse problems surface again, with diagnostics, if the file is bundled
        let Ok(source) = fs::read_to_string(path) else {
            debug!("Pre-scan could not read {}", path.display());
            return;
        };
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        self.file_sizes.insert(relative, source.len());

        let Ok(parsed) = syntax::parse(&source) else {
            debug!("Pre-scan could not parse {}", path.display());
            return;
        };
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let body = &parsed.module.body;

        for import in ImportDiscoveryVisitor::discover(body) {
            if import.kind != ImportKind::From {
                continue;
            }
            if import.is_star() {
                self.references.record_star_import();
                continue;
            }
            for (name, _) in &import.names {
                self.references.record(name, &canonical);
            }
        }

        for attribute in ReferenceCollector::for_body(body).attributes {
            self.references.record(&attribute, &canonical);
        }

        let exports = ExportCollector::analyze(body);
        trace!("{} exports {:?}", path.display(), exports.names);
        self.exports.insert(canonical, exports);
    }
}

fn is_excluded_dir(entry: &DirEntry, config: &Config) -> bool {
    // The root itself is never excluded, whatever its name
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| config.is_excluded(name))
}
