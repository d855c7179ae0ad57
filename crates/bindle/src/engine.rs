//! Concurrent bundling engine
//!
//! One task per discovered file. The first task to claim a file becomes its
//! only executor; any other task reaching it returns at once. A file's
//! children run on the rayon pool and are joined before the file itself is
//! rewritten.
//!
//! Which task wins a claim is up to the scheduler, so the bundle order is not
//! taken from task completion. After the run, contributions are collected by a
//! post-order walk over each file's children in discovery order: every child
//! precedes its parent and the result is the same on every run.

use std::{
    fs,
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
};

use dashmap::{DashMap, DashSet};
use log::{debug, trace};
use rayon::prelude::*;
use ruff_python_ast::ModModule;
use rustc_hash::FxHashSet;

use crate::{
    aggregator::ImportAggregator,
    assembler::frame_source,
    cache::{CacheEntry, ContentCache, ExternalImport, content_hash},
    config::Config,
    dependency_graph::DependencyGraph,
    export_table::ProjectIndex,
    optimizer::{PassChain, PassContext, panic_message},
    reporter::{Diagnostic, Phase, Reporter},
    resolver::ModuleResolver,
    rewriter::{ImportAnalysis, ReferenceRewriter},
    stats::BundleStats,
    syntax,
    visitors::ImportDiscoveryVisitor,
};

/// Shared state of one bundling run
#[derive(Clone, Copy)]
pub struct EngineContext<'a> {
    pub config: &'a Config,
    pub resolver: &'a ModuleResolver,
    pub index: &'a ProjectIndex,
    pub graph: &'a DependencyGraph,
    pub aggregator: &'a ImportAggregator,
    pub cache: &'a ContentCache,
    pub stats: &'a BundleStats,
    pub passes: &'a PassChain,
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for EngineContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("root", &self.resolver.root())
            .field("passes", &self.passes.pass_names())
            .finish_non_exhaustive()
    }
}

/// What processing one file left behind
#[derive(Debug, Clone, Default)]
struct ProcessedFile {
    children: Vec<PathBuf>,
    /// Framed body; `None` when the file could not be read
    output: Option<String>,
}

#[derive(Debug)]
pub struct BundleEngine<'a> {
    context: EngineContext<'a>,
    claimed: DashSet<PathBuf>,
    processed: DashMap<PathBuf, ProcessedFile>,
}

impl<'a> BundleEngine<'a> {
    pub fn new(context: EngineContext<'a>) -> Self {
        Self {
            context,
            claimed: DashSet::new(),
            processed: DashMap::new(),
        }
    }

    /// Number of files claimed so far
    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }

    /// Bundle everything reachable from `entry`; framed contributions in bundle order
    pub fn run(&self, entry: &Path) -> Vec<String> {
        self.process(entry);

        let mut emitted = FxHashSet::default();
        let mut contributions = Vec::new();
        self.collect_post_order(entry, &mut emitted, &mut contributions);
        contributions
    }

    /// Children first, in captured order; each file once even inside a cycle
    fn collect_post_order(
        &self,
        path: &Path,
        emitted: &mut FxHashSet<PathBuf>,
        contributions: &mut Vec<String>,
    ) {
        if !emitted.insert(path.to_path_buf()) {
            return;
        }
        let Some(processed) = self.processed.get(path).map(|entry| entry.value().clone()) else {
            return;
        };
        for child in &processed.children {
            self.collect_post_order(child, emitted, contributions);
        }
        contributions.extend(processed.output);
    }

    /// Process `path` and everything it reaches.
    ///
    /// Returns immediately when another task already claimed `path`.
    pub fn process(&self, path: &Path) {
        if !self.claimed.insert(path.to_path_buf()) {
            trace!("{} already claimed", path.display());
            return;
        }
        self.context.graph.add_file(path);
        debug!("Processing {}", path.display());

        let processed = self.process_claimed(path);
        self.processed.insert(path.to_path_buf(), processed);
    }

    fn process_claimed(&self, path: &Path) -> ProcessedFile {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                self.report(Diagnostic::new(path, Phase::Read, e.to_string()));
                return ProcessedFile::default();
            }
        };

        let hash = content_hash(&source);
        let fingerprint = &self.context.index.fingerprint;
        if let Some(entry) = self.context.cache.lookup(path, &hash, fingerprint) {
            return self.replay(path, entry);
        }

        let relative = self.relative_path(path);
        let line_count = source.lines().count();

        let mut parsed = match syntax::parse(&source) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report(Diagnostic::new(path, Phase::Parse, e.to_string()));
                self.context.stats.record_file(line_count);
                return ProcessedFile {
                    children: Vec::new(),
                    output: Some(frame_source(&relative, &source)),
                };
            }
        };

        let imports = ImportDiscoveryVisitor::discover(&parsed.module.body);
        let analysis = ImportAnalysis::analyze(&imports, path, self.context.resolver);
        self.record_analysis(path, &analysis.children, &analysis.externals);
        for specifier in &analysis.unresolved {
            self.report(Diagnostic::new(
                path,
                Phase::Resolve,
                format!("no project file matches relative import `{specifier}`"),
            ));
        }

        self.process_children(&analysis.children);

        self.rewrite(path, &mut parsed.module, &analysis);
        let pass_context = PassContext {
            path,
            references: &self.context.index.references,
            retain_prefix: &self.context.config.retain_prefix,
        };
        for diagnostic in self.context.passes.run(&mut parsed.module, &pass_context) {
            self.report(diagnostic);
        }

        let output = frame_source(&relative, &parsed.render());
        self.context.cache.store(
            path.to_path_buf(),
            CacheEntry {
                content_hash: hash,
                project_fingerprint: fingerprint.clone(),
                output: output.clone(),
                line_count,
                children: analysis.children.clone(),
                external_imports: analysis.externals,
                imports_resolved: analysis.resolved,
            },
        );
        self.context.stats.record_file(line_count);
        self.context.stats.record_imports(analysis.resolved);

        ProcessedFile {
            children: analysis.children,
            output: Some(output),
        }
    }

    /// Rebuild this run's shared state from a cache entry
    fn replay(&self, path: &Path, entry: CacheEntry) -> ProcessedFile {
        trace!("Cache hit for {}", path.display());
        self.context.stats.record_cache_hit();
        self.record_analysis(path, &entry.children, &entry.external_imports);

        self.process_children(&entry.children);
        self.context.stats.record_file(entry.line_count);
        self.context.stats.record_imports(entry.imports_resolved);
        ProcessedFile {
            children: entry.children,
            output: Some(entry.output),
        }
    }

    fn record_analysis(
        &self,
        path: &Path,
        children: &[PathBuf],
        externals: &[ExternalImport],
    ) {
        for child in children {
            if self.context.graph.add_dependency(path, child) {
                trace!("{} -> {}", path.display(), child.display());
            }
        }
        for external in externals {
            self.context.aggregator.add(external, path);
        }
    }

    /// One task per child; returns once all of them are done
    fn process_children(&self, children: &[PathBuf]) {
        children.par_iter().for_each(|child| self.process(child));
    }

    /// Apply the reference rewriter, keeping the tree untouched if it panics
    fn rewrite(
        &self,
        path: &Path,
        module: &mut ModModule,
        analysis: &ImportAnalysis,
    ) {
        let snapshot = module.clone();
        let rewriter = ReferenceRewriter::new(
            path,
            self.context.resolver,
            &self.context.index.exports,
            analysis,
        );
        match catch_unwind(AssertUnwindSafe(|| rewriter.rewrite(module))) {
            Ok(summary) => trace!(
                "{}: removed {} imports, rewrote {} references",
                path.display(),
                summary.removed_imports,
                summary.rewritten_references
            ),
            Err(payload) => {
                *module = snapshot;
                self.report(Diagnostic::new(
                    path,
                    Phase::Rewrite,
                    format!("rewriter panicked: {}", panic_message(payload.as_ref())),
                ));
            }
        }
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.context.resolver.root())
            .unwrap_or(path)
            .to_path_buf()
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.context.stats.record_failure();
        self.context.reporter.diagnostic(&diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;
    use crate::{reporter::RecordingReporter, resolver::NoPackageProbe};

    struct Run {
        _temp_dir: TempDir,
        root: PathBuf,
        config: Config,
        resolver: ModuleResolver,
        index: ProjectIndex,
        graph: DependencyGraph,
        aggregator: ImportAggregator,
        cache: ContentCache,
        stats: BundleStats,
        passes: PassChain,
        reporter: RecordingReporter,
    }

    impl Run {
        fn new(files: &[(&str, &str)]) -> Result<Self> {
            let temp_dir = TempDir::new()?;
            let root = temp_dir.path().canonicalize()?;
            for (relative, content) in files {
                let path = root.join(relative);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, content)?;
            }
            let config = Config::default();
            let resolver =
                ModuleResolver::new(&root, &config).with_probe(Box::new(NoPackageProbe));
            let index = ProjectIndex::scan(&root, &config);
            let passes = PassChain::from_config(&config);
            Ok(Self {
                _temp_dir: temp_dir,
                root,
                config,
                resolver,
                index,
                graph: DependencyGraph::new(),
                aggregator: ImportAggregator::new(),
                cache: ContentCache::new(),
                stats: BundleStats::new(),
                passes,
                reporter: RecordingReporter::new(),
            })
        }

        fn context(&self) -> EngineContext<'_> {
            EngineContext {
                config: &self.config,
                resolver: &self.resolver,
                index: &self.index,
                graph: &self.graph,
                aggregator: &self.aggregator,
                cache: &self.cache,
                stats: &self.stats,
                passes: &self.passes,
                reporter: &self.reporter,
            }
        }

        fn process(&self, entry: &str) -> Vec<String> {
            BundleEngine::new(self.context()).run(&self.root.join(entry))
        }
    }

    fn sources(contributions: &[String]) -> Vec<String> {
        contributions
            .iter()
            .filter_map(|contribution| {
                contribution
                    .lines()
                    .find_map(|line| line.strip_prefix("# Source from: "))
                    .map(str::to_string)
            })
            .collect()
    }

    #[test]
    fn test_shared_child_is_processed_once() -> Result<()> {
        let run = Run::new(&[
            ("main.py", "import a\nimport b\n"),
            ("a.py", "import shared\n"),
            ("b.py", "import shared\n"),
            ("shared.py", "VALUE = 1\n"),
        ])?;

        let contributions = run.process("main.py");

        assert_eq!(sources(&contributions), vec!["shared.py", "a.py", "b.py", "main.py"]);
        assert_eq!(run.stats.snapshot().files_processed, 4);
        assert_eq!(run.graph.edge_count(), 4);
        Ok(())
    }

    #[test]
    fn test_cycle_terminates_with_each_file_once() -> Result<()> {
        let run = Run::new(&[
            ("main.py", "import a\n"),
            ("a.py", "import b\n"),
            ("b.py", "import a\n"),
        ])?;

        let contributions = run.process("main.py");

        assert_eq!(sources(&contributions), vec!["b.py", "a.py", "main.py"]);
        assert_eq!(run.graph.find_cycles(&run.root.join("main.py")).len(), 1);
        Ok(())
    }

    #[test]
    fn test_parse_failure_keeps_original_text() -> Result<()> {
        let run = Run::new(&[
            ("main.py", "import broken\nimport os\n"),
            ("broken.py", "def broken(:\n"),
        ])?;

        let contributions = run.process("main.py");

        assert_eq!(sources(&contributions), vec!["broken.py", "main.py"]);
        assert!(contributions[0].contains("def broken(:"));
        let diagnostics = run.reporter.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].phase, Phase::Parse);
        assert_eq!(run.stats.snapshot().failures, 1);
        assert_eq!(run.aggregator.len(), 1);
        Ok(())
    }

    #[test]
    fn test_cache_hit_replays_children_and_imports() -> Result<()> {
        let run = Run::new(&[
            ("main.py", "import sys\nimport helpers\nprint(helpers.VALUE)\n"),
            ("helpers.py", "import json\nVALUE = 1\n"),
        ])?;

        let first = run.process("main.py");
        let second_aggregator = ImportAggregator::new();
        let second_graph = DependencyGraph::new();
        let context = EngineContext {
            aggregator: &second_aggregator,
            graph: &second_graph,
            ..run.context()
        };
        let second = BundleEngine::new(context).run(&run.root.join("main.py"));

        assert_eq!(first, second);
        assert_eq!(run.stats.snapshot().cache_hits, 2);
        assert_eq!(second_aggregator.len(), 2);
        assert_eq!(second_graph.edge_count(), 1);
        Ok(())
    }
}
