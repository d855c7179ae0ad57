//! Pruning of `if` statements on literal conditions

use anyhow::Result;
use ruff_python_ast::{ElifElseClause, ExceptHandler, Expr, ModModule, Number, Stmt, StmtIf};

use super::{OptimizationPass, PassContext};
use crate::ast_builder;

/// Replaces `if <literal>:` by the branch Python would take.
///
/// A false literal `elif` is dropped and a true one becomes the final `else`.
/// Only literals are judged, so `if 2 * 0:` is pruned only when constant
/// folding ran first, and `if 2 > 1:` is left alone. A block that ends up
/// empty gets a `pass`; an emptied module body stays empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantConditionPruning;

impl OptimizationPass for ConstantConditionPruning {
    fn name(&self) -> &'static str {
        "constant-condition-pruning"
    }

    fn run(&self, module: &mut ModModule, _context: &PassContext<'_>) -> Result<usize> {
        let mut pruner = Pruner::default();
        pruner.process_body(&mut module.body, false);
        Ok(pruner.pruned)
    }
}

#[derive(Debug, Default)]
struct Pruner {
    /// Conditions decided so far
    pruned: usize,
}

impl Pruner {
    /// Prune `body` and every block nested in it.
    ///
    /// `required` marks blocks Python does not allow to be empty.
    fn process_body(&mut self, body: &mut Vec<Stmt>, required: bool) {
        for stmt in std::mem::take(body) {
            match stmt {
                Stmt::If(if_stmt) => self.prune_if(if_stmt, body),
                mut stmt => {
                    self.process_nested(&mut stmt);
                    body.push(stmt);
                }
            }
        }

        if required && body.is_empty() {
            body.push(ast_builder::pass());
        }
    }

    fn process_nested(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::FunctionDef(func_def) => self.process_body(&mut func_def.body, true),
            Stmt::ClassDef(class_def) => self.process_body(&mut class_def.body, true),
            Stmt::For(for_stmt) => {
                self.process_body(&mut for_stmt.body, true);
                self.process_body(&mut for_stmt.orelse, false);
            }
            Stmt::While(while_stmt) => {
                self.process_body(&mut while_stmt.body, true);
                self.process_body(&mut while_stmt.orelse, false);
            }
            Stmt::With(with_stmt) => self.process_body(&mut with_stmt.body, true),
            Stmt::Try(try_stmt) => {
                self.process_body(&mut try_stmt.body, true);
                for handler in &mut try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    self.process_body(&mut handler.body, true);
                }
                self.process_body(&mut try_stmt.orelse, false);
                // `try` needs a handler or a `finally`
                let finally_required =
                    try_stmt.handlers.is_empty() && !try_stmt.finalbody.is_empty();
                self.process_body(&mut try_stmt.finalbody, finally_required);
            }
            Stmt::Match(match_stmt) => {
                for case in &mut match_stmt.cases {
                    self.process_body(&mut case.body, true);
                }
            }
            _ => {}
        }
    }

    /// Push what remains of `if_stmt` onto `out`
    fn prune_if(&mut self, mut if_stmt: StmtIf, out: &mut Vec<Stmt>) {
        while let Some(taken) = literal_truthiness(&if_stmt.test) {
            self.pruned += 1;
            if taken {
                self.splice(if_stmt.body, out);
                return;
            }

            let mut clauses = std::mem::take(&mut if_stmt.elif_else_clauses).into_iter();
            match clauses.next() {
                None => return,
                Some(ElifElseClause {
                    test: None, body, ..
                }) => {
                    self.splice(body, out);
                    return;
                }
                Some(ElifElseClause {
                    test: Some(test),
                    body,
                    ..
                }) => {
                    if_stmt.test = Box::new(test);
                    if_stmt.body = body;
                    if_stmt.elif_else_clauses = clauses.collect();
                }
            }
        }

        self.prune_clauses(&mut if_stmt.elif_else_clauses);
        self.process_body(&mut if_stmt.body, true);
        for clause in &mut if_stmt.elif_else_clauses {
            self.process_body(&mut clause.body, true);
        }
        out.push(Stmt::If(if_stmt));
    }

    /// Drop false literal `elif`s; a true one becomes the final `else`
    fn prune_clauses(&mut self, clauses: &mut Vec<ElifElseClause>) {
        let mut kept = Vec::with_capacity(clauses.len());
        for mut clause in std::mem::take(clauses) {
            match clause.test.as_ref().and_then(literal_truthiness) {
                Some(false) => self.pruned += 1,
                Some(true) => {
                    self.pruned += 1;
                    clause.test = None;
                    kept.push(clause);
                    break;
                }
                None => kept.push(clause),
            }
        }
        *clauses = kept;
    }

    fn splice(&mut self, mut body: Vec<Stmt>, out: &mut Vec<Stmt>) {
        self.process_body(&mut body, false);
        out.extend(body);
    }
}

/// Truth value of a literal condition
fn literal_truthiness(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::BooleanLiteral(boolean) => Some(boolean.value),
        Expr::NoneLiteral(_) => Some(false),
        Expr::EllipsisLiteral(_) => Some(true),
        Expr::NumberLiteral(number) => Some(match &number.value {
            // Integers beyond u64 are never zero
            Number::Int(int) => int.as_u64().is_none_or(|value| value != 0),
            Number::Float(value) => *value != 0.0,
            Number::Complex { real, imag } => *real != 0.0 || *imag != 0.0,
        }),
        Expr::StringLiteral(string) => Some(!string.value.is_empty()),
        _ => None,
    }
}
