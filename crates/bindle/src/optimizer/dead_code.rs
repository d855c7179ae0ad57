//! Removal of unreferenced top-level functions

use anyhow::Result;
use log::debug;
use ruff_python_ast::{ModModule, Stmt, StmtFunctionDef};
use rustc_hash::FxHashSet;

use super::{OptimizationPass, PassContext};
use crate::visitors::{ExportCollector, ReferenceCollector};

/// Removes a top-level function when nothing can call it.
///
/// A function survives when its name is loaded by any other top-level
/// statement of the file, starts with the retention prefix, is decorated, is
/// listed in `__all__`, or is reached from another project file.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    fn is_retained(
        func_def: &StmtFunctionDef,
        all: Option<&[String]>,
        context: &PassContext<'_>,
    ) -> bool {
        let name = func_def.name.as_str();
        (!context.retain_prefix.is_empty() && name.starts_with(context.retain_prefix))
            || !func_def.decorator_list.is_empty()
            || all.is_some_and(|all| all.iter().any(|exported| exported == name))
            || context.references.is_referenced_outside(name, context.path)
    }
}

impl OptimizationPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&self, module: &mut ModModule, context: &PassContext<'_>) -> Result<usize> {
        let all = ExportCollector::analyze(&module.body).all;

        // Loads per top-level statement, so a function's own body does not keep it alive
        let loads: Vec<FxHashSet<String>> = module
            .body
            .iter()
            .map(|stmt| ReferenceCollector::for_stmt(stmt).loaded_names)
            .collect();

        let dead: FxHashSet<usize> = module
            .body
            .iter()
            .enumerate()
            .filter_map(|(index, stmt)| {
                let Stmt::FunctionDef(func_def) = stmt else {
                    return None;
                };
                if Self::is_retained(func_def, all.as_deref(), context) {
                    return None;
                }
                let name = func_def.name.as_str();
                let used = loads
                    .iter()
                    .enumerate()
                    .any(|(other, names)| other != index && names.contains(name));
                (!used).then_some(index)
            })
            .collect();

        if dead.is_empty() {
            return Ok(0);
        }

        let mut index = 0;
        module.body.retain(|stmt| {
            let keep = !dead.contains(&index);
            if !keep && let Stmt::FunctionDef(func_def) = stmt {
                debug!(
                    "Removing unreferenced function {} from {}",
                    func_def.name,
                    context.path.display()
                );
            }
            index += 1;
            keep
        });

        Ok(dead.len())
    }
}
