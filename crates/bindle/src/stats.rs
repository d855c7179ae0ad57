//! Bundle statistics
//!
//! Counters are updated by every engine task and therefore atomic. They are read
//! once at the end of a run into a [`BundleSummary`].

use std::{
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct BundleStats {
    files_processed: AtomicUsize,
    total_lines: AtomicUsize,
    imports_resolved: AtomicUsize,
    cache_hits: AtomicUsize,
    failures: AtomicUsize,
}

/// Counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub files_processed: usize,
    pub total_lines: usize,
    pub imports_resolved: usize,
    pub cache_hits: usize,
    pub failures: usize,
}

impl BundleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file whose contribution was produced
    pub fn record_file(&self, line_count: usize) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.total_lines.fetch_add(line_count, Ordering::Relaxed);
    }

    pub fn record_imports(&self, count: usize) {
        self.imports_resolved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            total_lines: self.total_lines.load(Ordering::Relaxed),
            imports_resolved: self.imports_resolved.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Final statistics of a bundling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    pub counters: StatsSnapshot,
    pub processing_time: Duration,
    /// Original size in bytes of every project file seen by the pre-scan
    pub file_sizes: IndexMap<PathBuf, usize>,
    /// Size in bytes of the written bundle
    pub bundle_size: usize,
    /// Original total size minus bundle size; informational only
    pub optimization_savings: i64,
    /// Dependency cycles found, as paths relative to the project root
    pub cycles: Vec<Vec<PathBuf>>,
}

impl BundleSummary {
    pub fn original_size(&self) -> usize {
        self.file_sizes.values().sum()
    }
}

/// Signed difference between the original sources and the bundle
pub fn size_savings(original_size: usize, bundle_size: usize) -> i64 {
    let original = i64::try_from(original_size).unwrap_or(i64::MAX);
    let bundle = i64::try_from(bundle_size).unwrap_or(i64::MAX);
    original.saturating_sub(bundle)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(BundleStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_file(2);
                        stats.record_imports(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.files_processed, 8000);
        assert_eq!(snapshot.total_lines, 16000);
        assert_eq!(snapshot.imports_resolved, 8000);
    }

    #[test]
    fn test_size_savings_can_be_negative() {
        assert_eq!(size_savings(100, 40), 60);
        assert_eq!(size_savings(40, 100), -60);
    }
}
