//! Content cache
//!
//! Keyed by canonical file path. An entry is only valid while the file's
//! SHA-256 digest matches and the project fingerprint it was produced under
//! is unchanged: a file's output also depends on what other files export and
//! reference, and on which files exist. Entries store what a run needs to
//! replay when reused (children to dispatch, external imports for the header).

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::resolver::ImportOrigin;

/// An external import statement a file contributed to the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalImport {
    /// Rendered statement, used as the deduplication key
    pub statement: String,
    /// Module the statement imports from
    pub module: String,
    pub origin: ImportOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub content_hash: String,
    /// Pre-scan fingerprint of the project when the entry was produced
    pub project_fingerprint: String,
    /// The file's own framed, transformed body
    pub output: String,
    pub line_count: usize,
    /// Resolved internal children in first-occurrence order
    pub children: Vec<PathBuf>,
    pub external_imports: Vec<ExternalImport>,
    /// Number of import specifiers that resolved internally
    pub imports_resolved: usize,
}

#[derive(Debug, Default)]
pub struct ContentCache {
    entries: DashMap<PathBuf, CacheEntry>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `path` if it was produced from content with `content_hash`
    /// within a project whose pre-scan yielded `project_fingerprint`
    pub fn lookup(
        &self,
        path: &Path,
        content_hash: &str,
        project_fingerprint: &str,
    ) -> Option<CacheEntry> {
        self.entries
            .get(path)
            .filter(|entry| {
                entry.content_hash == content_hash
                    && entry.project_fingerprint == project_fingerprint
            })
            .map(|entry| entry.value().clone())
    }

    /// Insert or replace the entry for `path`
    pub fn store(&self, path: PathBuf, entry: CacheEntry) {
        self.entries.insert(path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex-encoded SHA-256 digest of file content
pub fn content_hash(content: &str) -> String {
    to_hex(&Sha256::digest(content.as_bytes()))
}

pub(crate) fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str) -> CacheEntry {
        CacheEntry {
            content_hash: hash.to_string(),
            project_fingerprint: "project".to_string(),
            output: "x = 1".to_string(),
            line_count: 1,
            children: vec![PathBuf::from("/project/child.py")],
            external_imports: Vec::new(),
            imports_resolved: 1,
        }
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a = 1"), content_hash("a = 2"));
    }

    #[test]
    fn test_lookup_requires_matching_hash() {
        let cache = ContentCache::new();
        let path = PathBuf::from("/project/main.py");
        cache.store(path.clone(), entry("abc"));

        assert!(cache.lookup(&path, "abc", "project").is_some());
        assert!(cache.lookup(&path, "def", "project").is_none());
        assert!(cache.lookup(Path::new("/project/other.py"), "abc", "project").is_none());
    }

    #[test]
    fn test_lookup_requires_matching_project_fingerprint() {
        let cache = ContentCache::new();
        let path = PathBuf::from("/project/helpers.py");
        cache.store(path.clone(), entry("abc"));

        // Same content, but another file now references one of its functions
        assert!(cache.lookup(&path, "abc", "project-after-edit").is_none());
        assert!(cache.lookup(&path, "abc", "project").is_some());
    }

    #[test]
    fn test_store_replaces_stale_entry() {
        let cache = ContentCache::new();
        let path = PathBuf::from("/project/main.py");
        cache.store(path.clone(), entry("old"));
        cache.store(path.clone(), entry("new"));

        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&path, "old", "project").is_none());
        assert_eq!(
            cache.lookup(&path, "new", "project").map(|entry| entry.children),
            Some(vec![PathBuf::from("/project/child.py")])
        );
    }
}
