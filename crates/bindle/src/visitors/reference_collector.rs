//! Name reference collection
//!
//! Records every name read (`ExprContext::Load`) and every attribute accessed
//! in a subtree. Used by dead-code elimination and by the project pre-scan.

use ruff_python_ast::{
    Expr, ExprContext, Stmt,
    visitor::{Visitor, walk_expr},
};
use rustc_hash::FxHashSet;

/// Names read and attributes accessed within a subtree
#[derive(Debug, Default)]
pub struct ReferenceCollector {
    /// Names read in load context
    pub loaded_names: FxHashSet<String>,
    /// Attribute names accessed through `value.attr`
    pub attributes: FxHashSet<String>,
}

impl ReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect references of a single statement
    pub fn for_stmt(stmt: &Stmt) -> Self {
        let mut collector = Self::new();
        collector.visit_stmt(stmt);
        collector
    }

    /// Collect references of a statement list
    pub fn for_body(body: &[Stmt]) -> Self {
        let mut collector = Self::new();
        collector.visit_body(body);
        collector
    }
}

impl<'a> Visitor<'a> for ReferenceCollector {
    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(name) if name.ctx == ExprContext::Load => {
                self.loaded_names.insert(name.id.to_string());
            }
            Expr::Attribute(attribute) => {
                self.attributes.insert(attribute.attr.to_string());
            }
            _ => {}
        }

        walk_expr(self, expr);
    }
}
