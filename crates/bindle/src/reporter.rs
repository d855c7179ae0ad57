//! Presentation sink
//!
//! Every component that has something to tell the user receives a
//! `&dyn Reporter`. Internal tracing goes through `log` directly; the reporter
//! carries what a user of the tool should see: progress, per-file diagnostics
//! and the final statistics.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::stats::BundleSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// Processing stage in which a per-file problem occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Read,
    Parse,
    Resolve,
    Rewrite,
    /// An optimization pass, by name
    Pass(&'static str),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Parse => f.write_str("parse"),
            Self::Resolve => f.write_str("resolve"),
            Self::Rewrite => f.write_str("rewrite"),
            Self::Pass(name) => f.write_str(name),
        }
    }
}

/// A non-fatal problem with one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub phase: Phase,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: &Path, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            phase,
            message: message.into(),
        }
    }

    /// Read failures lose a whole file, everything else degrades gracefully
    pub fn level(&self) -> Level {
        match self.phase {
            Phase::Read => Level::Error,
            Phase::Parse | Phase::Resolve | Phase::Rewrite | Phase::Pass(_) => Level::Warning,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} failed: {}",
            self.path.display(),
            self.phase,
            self.message
        )
    }
}

pub trait Reporter: Send + Sync {
    fn message(&self, level: Level, message: &str);

    fn diagnostic(&self, diagnostic: &Diagnostic) {
        self.message(diagnostic.level(), &diagnostic.to_string());
    }

    fn summary(&self, summary: &BundleSummary);
}

/// Reporter that forwards everything to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn message(&self, level: Level, message: &str) {
        match level {
            Level::Info => info!("{message}"),
            Level::Success => info!("✓ {message}"),
            Level::Warning => warn!("{message}"),
            Level::Error => error!("{message}"),
        }
    }

    fn summary(&self, summary: &BundleSummary) {
        let counters = &summary.counters;
        info!("Bundle statistics:");
        info!("  files processed:   {}", counters.files_processed);
        info!("  lines bundled:     {}", counters.total_lines);
        info!("  imports resolved:  {}", counters.imports_resolved);
        info!("  cache hits:        {}", counters.cache_hits);
        info!("  failures:          {}", counters.failures);
        info!(
            "  processing time:   {:.2}ms",
            summary.processing_time.as_secs_f64() * 1000.0
        );
        info!("  original size:     {} bytes", summary.original_size());
        info!("  bundle size:       {} bytes", summary.bundle_size);
        info!("  size savings:      {} bytes", summary.optimization_savings);
        for cycle in &summary.cycles {
            let members: Vec<String> = cycle.iter().map(|path| path.display().to_string()).collect();
            warn!("  cycle: {}", members.join(" -> "));
        }
    }
}

/// Reporter that keeps everything it receives
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<(Level, String)>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    summaries: Mutex<Vec<BundleSummary>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.lock().clone()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    pub fn last_summary(&self) -> Option<BundleSummary> {
        self.summaries.lock().last().cloned()
    }
}

impl Reporter for RecordingReporter {
    fn message(&self, level: Level, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }

    fn diagnostic(&self, diagnostic: &Diagnostic) {
        self.diagnostics.lock().push(diagnostic.clone());
        self.message(diagnostic.level(), &diagnostic.to_string());
    }

    fn summary(&self, summary: &BundleSummary) {
        self.summaries.lock().push(summary.clone());
    }
}
