//! Optimization pass chain
//!
//! Passes run in order over each rewritten module. A pass that errors or
//! panics leaves the module exactly as it was before that pass ran; the next
//! pass still runs.

mod constant_conditions;
mod constant_folding;
mod dead_code;

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    path::Path,
};

use anyhow::Result;
use log::{debug, trace};
use ruff_python_ast::ModModule;

pub use constant_conditions::ConstantConditionPruning;
pub use constant_folding::ConstantFolding;
pub use dead_code::DeadCodeElimination;

use crate::{
    config::Config,
    export_table::ReferenceIndex,
    reporter::{Diagnostic, Phase},
};

/// What a pass may consult besides the module itself
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub path: &'a Path,
    pub references: &'a ReferenceIndex,
    /// Functions starting with this prefix are never removed; empty disables the marker
    pub retain_prefix: &'a str,
}

pub trait OptimizationPass: fmt::Debug + Send + Sync {
    /// Stable name, also used as the diagnostic phase
    fn name(&self) -> &'static str;

    /// Transform the module in place, returning the number of changes made
    fn run(&self, module: &mut ModModule, context: &PassContext<'_>) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct PassChain {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl PassChain {
    pub fn new(passes: Vec<Box<dyn OptimizationPass>>) -> Self {
        Self { passes }
    }

    /// The built-in passes enabled by `config`, in their fixed order
    pub fn from_config(config: &Config) -> Self {
        let mut passes: Vec<Box<dyn OptimizationPass>> = Vec::new();
        if config.dead_code_elimination {
            passes.push(Box::new(DeadCodeElimination));
        }
        if config.constant_folding {
            passes.push(Box::new(ConstantFolding));
        }
        // Folded conditions become literals the pruning pass can decide
        if config.constant_condition_pruning {
            passes.push(Box::new(ConstantConditionPruning));
        }
        Self::new(passes)
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass; failed passes are rolled back and reported
    pub fn run(&self, module: &mut ModModule, context: &PassContext<'_>) -> Vec<Diagnostic> {
        let mut failures = Vec::new();

        for pass in &self.passes {
            let snapshot = module.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| pass.run(module, context)));

            let message = match outcome {
                Ok(Ok(changes)) => {
                    trace!(
                        "{} made {changes} changes in {}",
                        pass.name(),
                        context.path.display()
                    );
                    continue;
                }
                Ok(Err(error)) => format!("{error:#}"),
                Err(payload) => format!("pass panicked: {}", panic_message(payload.as_ref())),
            };

            debug!(
                "Rolling back {} on {}: {message}",
                pass.name(),
                context.path.display()
            );
            *module = snapshot;
            failures.push(Diagnostic::new(context.path, Phase::Pass(pass.name()), message));
        }

        failures
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use ruff_python_ast::Stmt;

    use super::*;
    use crate::{ast_builder, syntax};

    /// Appends a statement, then fails
    #[derive(Debug)]
    struct FailingPass;

    impl OptimizationPass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&self, module: &mut ModModule, _context: &PassContext<'_>) -> Result<usize> {
            module.body.push(ast_builder::pass());
            bail!("gave up halfway")
        }
    }

    #[derive(Debug)]
    struct PanickingPass;

    impl OptimizationPass for PanickingPass {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn run(&self, module: &mut ModModule, _context: &PassContext<'_>) -> Result<usize> {
            module.body.clear();
            panic!("boom");
        }
    }

    #[derive(Debug)]
    struct AppendPass;

    impl OptimizationPass for AppendPass {
        fn name(&self) -> &'static str {
            "append"
        }

        fn run(&self, module: &mut ModModule, _context: &PassContext<'_>) -> Result<usize> {
            module.body.push(ast_builder::pass());
            Ok(1)
        }
    }

    #[test]
    fn test_failed_passes_are_rolled_back() {
        let mut parsed = syntax::parse("x = 1\n").expect("source should parse");
        let references = ReferenceIndex::default();
        let context = PassContext {
            path: Path::new("mod.py"),
            references: &references,
            retain_prefix: "_",
        };
        let chain = PassChain::new(vec![
            Box::new(FailingPass),
            Box::new(PanickingPass),
            Box::new(AppendPass),
        ]);

        let failures = chain.run(&mut parsed.module, &context);

        assert_eq!(
            failures
                .iter()
                .map(|failure| (failure.phase, failure.message.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (Phase::Pass("failing"), "gave up halfway"),
                (Phase::Pass("panicking"), "pass panicked: boom"),
            ]
        );
        assert_eq!(parsed.module.body.len(), 2);
        assert!(matches!(parsed.module.body[0], Stmt::Assign(_)));
        assert_eq!(parsed.render(), "x = 1\npass");
    }

    #[test]
    fn test_from_config_respects_switches() {
        let mut config = Config::default();
        assert_eq!(
            PassChain::from_config(&config).pass_names(),
            vec![
                "dead-code-elimination",
                "constant-folding",
                "constant-condition-pruning"
            ]
        );

        config.dead_code_elimination = false;
        config.constant_condition_pruning = false;
        assert_eq!(
            PassChain::from_config(&config).pass_names(),
            vec!["constant-folding"]
        );
    }
}
