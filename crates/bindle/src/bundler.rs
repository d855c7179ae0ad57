//! Bundling orchestration
//!
//! Validates the inputs, runs the project pre-scan, drives the engine inside a
//! dedicated rayon pool and assembles the artifact. A [`Bundler`] keeps its
//! content cache between runs.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use log::{debug, info};
use rayon::ThreadPoolBuilder;

use crate::{
    aggregator::ImportAggregator,
    assembler::BundleAssembler,
    cache::ContentCache,
    config::Config,
    dependency_graph::DependencyGraph,
    engine::{BundleEngine, EngineContext},
    error::{BundleError, BundleResult},
    export_table::ProjectIndex,
    optimizer::PassChain,
    reporter::{Level, Reporter},
    resolver::ModuleResolver,
    stats::{BundleStats, BundleSummary, size_savings},
};

/// An assembled bundle that has not been written yet
#[derive(Debug, Clone)]
pub struct Bundle {
    pub content: String,
    pub summary: BundleSummary,
}

#[derive(Debug)]
pub struct Bundler {
    config: Config,
    cache: ContentCache,
}

impl Bundler {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache: ContentCache::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cache shared by every run of this bundler
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Bundle `entry` (relative to `root`) and write the result to `output`
    pub fn bundle(
        &self,
        root: &Path,
        entry: &Path,
        output: &Path,
        reporter: &dyn Reporter,
    ) -> BundleResult<BundleSummary> {
        let bundle = self.build(root, entry, reporter)?;

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| BundleError::OutputWrite {
                path: output.to_path_buf(),
                source,
            })?;
        }
        fs::write(output, &bundle.content).map_err(|source| BundleError::OutputWrite {
            path: output.to_path_buf(),
            source,
        })?;

        reporter.message(
            Level::Success,
            &format!("Bundle written to {}", output.display()),
        );
        reporter.summary(&bundle.summary);
        Ok(bundle.summary)
    }

    /// Produce the bundle text without writing it
    pub fn build(&self, root: &Path, entry: &Path, reporter: &dyn Reporter) -> BundleResult<Bundle> {
        let start = Instant::now();
        let (root, entry_path) = validate_inputs(root, entry)?;
        let entry_name = relative_display(&entry_path, &root);
        reporter.message(
            Level::Info,
            &format!("Bundling {entry_name} from {}", root.display()),
        );

        let index = ProjectIndex::scan(&root, &self.config);
        let resolver = ModuleResolver::new(&root, &self.config);
        let graph = DependencyGraph::new();
        let aggregator = ImportAggregator::new();
        let stats = BundleStats::new();
        let passes = PassChain::from_config(&self.config);
        debug!("Optimization passes: {:?}", passes.pass_names());

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.unwrap_or(0))
            .thread_name(|index| format!("bindle-worker-{index}"))
            .build()?;
        info!("Bundling with {} worker threads", pool.current_num_threads());

        let engine = BundleEngine::new(EngineContext {
            config: &self.config,
            resolver: &resolver,
            index: &index,
            graph: &graph,
            aggregator: &aggregator,
            cache: &self.cache,
            stats: &stats,
            passes: &passes,
            reporter,
        });
        let contributions = pool.install(|| engine.run(&entry_path));
        debug!(
            "Engine claimed {} files, graph has {} nodes and {} edges",
            engine.claimed_count(),
            graph.node_count(),
            graph.edge_count()
        );
        debug!("Dependency tree:\n{}", graph.render_tree(&entry_path, &root));

        let cycles: Vec<Vec<PathBuf>> = graph
            .find_cycles(&entry_path)
            .into_iter()
            .map(|cycle| {
                cycle
                    .iter()
                    .map(|path| path.strip_prefix(&root).unwrap_or(path).to_path_buf())
                    .collect()
            })
            .collect();
        for cycle in &cycles {
            let members: Vec<String> = cycle.iter().map(|path| path.display().to_string()).collect();
            reporter.message(
                Level::Warning,
                &format!("Circular dependency: {}", members.join(" -> ")),
            );
        }

        let counters = stats.snapshot();
        let content = BundleAssembler::new(entry_name).assemble(
            &aggregator.render(&resolver),
            &contributions,
            counters.files_processed,
            counters.total_lines,
        );

        let original_size: usize = index.file_sizes.values().sum();
        let summary = BundleSummary {
            counters: stats.snapshot(),
            processing_time: start.elapsed(),
            bundle_size: content.len(),
            optimization_savings: size_savings(original_size, content.len()),
            file_sizes: index.file_sizes,
            cycles,
        };
        Ok(Bundle { content, summary })
    }
}

/// Canonical project root and entry file
fn validate_inputs(root: &Path, entry: &Path) -> BundleResult<(PathBuf, PathBuf)> {
    if !root.is_dir() {
        return Err(BundleError::InvalidProjectRoot(root.to_path_buf()));
    }
    let root = root
        .canonicalize()
        .map_err(|_| BundleError::InvalidProjectRoot(root.to_path_buf()))?;

    let entry_path = root.join(entry);
    if !entry_path.is_file() {
        return Err(BundleError::MissingEntryFile(entry_path));
    }
    let entry_path = entry_path
        .canonicalize()
        .map_err(|_| BundleError::MissingEntryFile(entry_path.clone()))?;
    Ok((root, entry_path))
}

fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;
    use crate::reporter::RecordingReporter;

    #[test]
    fn test_invalid_root() {
        let bundler = Bundler::new(Config::default());
        let error = bundler
            .build(
                Path::new("/definitely/not/a/project"),
                Path::new("main.py"),
                &RecordingReporter::new(),
            )
            .expect_err("root does not exist");
        assert!(matches!(error, BundleError::InvalidProjectRoot(_)));
    }

    #[test]
    fn test_missing_entry() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let bundler = Bundler::new(Config::default());
        let error = bundler
            .build(temp_dir.path(), Path::new("main.py"), &RecordingReporter::new())
            .expect_err("entry does not exist");
        assert!(matches!(error, BundleError::MissingEntryFile(_)));
        Ok(())
    }

    #[test]
    fn test_summary_counts_and_sizes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("main.py"), "import helpers\nprint(helpers.X)\n")?;
        fs::write(temp_dir.path().join("helpers.py"), "X = 2 + 3\n")?;
        let reporter = RecordingReporter::new();

        let bundle = Bundler::new(Config::default()).build(
            temp_dir.path(),
            Path::new("main.py"),
            &reporter,
        )?;

        assert_eq!(bundle.summary.counters.files_processed, 2);
        assert_eq!(bundle.summary.counters.total_lines, 3);
        assert_eq!(bundle.summary.counters.imports_resolved, 1);
        assert_eq!(bundle.summary.original_size(), 42);
        assert_eq!(bundle.summary.bundle_size, bundle.content.len());
        assert!(bundle.content.contains("X = 5\n"));
        assert!(bundle.content.contains("print(X)\n"));
        assert!(reporter.diagnostics().is_empty());
        Ok(())
    }

    #[test]
    fn test_single_worker_pool() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("main.py"), "x = 1\n")?;
        let config = Config {
            jobs: Some(1),
            ..Config::default()
        };

        let bundle = Bundler::new(config).build(
            temp_dir.path(),
            Path::new("main.py"),
            &RecordingReporter::new(),
        )?;
        assert!(bundle.content.contains("x = 1\n"));
        Ok(())
    }
}
