//! Export collection for Python modules
//!
//! Collects the names a module defines at module scope: functions, classes,
//! assignment targets and import bindings, including those nested in
//! module-level control flow (`if`, `try`, `with`, loops). Function and class
//! bodies are not entered. Literal `__all__` declarations are recorded
//! separately.

use indexmap::IndexSet;
use ruff_python_ast::{ExceptHandler, Expr, ExprList, ExprStringLiteral, ExprTuple, Stmt};

/// Names a module defines at module scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleExports {
    /// Top-level definitions in source order
    pub names: IndexSet<String>,
    /// Contents of a literal `__all__`, if the module declares one
    pub all: Option<Vec<String>>,
}

impl ModuleExports {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Collector for module-scope definitions
#[derive(Debug, Default)]
pub struct ExportCollector {
    exports: ModuleExports,
}

impl ExportCollector {
    /// Analyze a module body and return its exports
    pub fn analyze(body: &[Stmt]) -> ModuleExports {
        let mut collector = Self::default();
        collector.collect_body(body);
        collector.exports
    }

    fn collect_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.collect_stmt(stmt);
        }
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(func_def) => {
                self.exports.names.insert(func_def.name.to_string());
            }
            Stmt::ClassDef(class_def) => {
                self.exports.names.insert(class_def.name.to_string());
            }
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    if let Expr::Name(name) = target
                        && name.id.as_str() == "__all__"
                    {
                        self.exports.all = extract_string_list(&assign.value);
                    }
                    self.collect_target(target);
                }
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    // `import a.b` binds `a`
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        None => alias.name.as_str().split('.').next().unwrap_or_default(),
                    };
                    self.exports.names.insert(bound.to_string());
                }
            }
            Stmt::ImportFrom(import_from) => {
                for alias in &import_from.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let bound = alias.asname.as_ref().unwrap_or(&alias.name);
                    self.exports.names.insert(bound.to_string());
                }
            }
            Stmt::AnnAssign(ann_assign) => self.collect_target(&ann_assign.target),
            Stmt::AugAssign(aug_assign) => self.collect_target(&aug_assign.target),
            Stmt::If(if_stmt) => {
                self.collect_body(&if_stmt.body);
                for clause in &if_stmt.elif_else_clauses {
                    self.collect_body(&clause.body);
                }
            }
            Stmt::Try(try_stmt) => {
                self.collect_body(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    self.collect_body(&handler.body);
                }
                self.collect_body(&try_stmt.orelse);
                self.collect_body(&try_stmt.finalbody);
            }
            Stmt::With(with_stmt) => self.collect_body(&with_stmt.body),
            Stmt::For(for_stmt) => {
                self.collect_target(&for_stmt.target);
                self.collect_body(&for_stmt.body);
                self.collect_body(&for_stmt.orelse);
            }
            Stmt::While(while_stmt) => {
                self.collect_body(&while_stmt.body);
                self.collect_body(&while_stmt.orelse);
            }
            _ => {}
        }
    }

    fn collect_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => {
                self.exports.names.insert(name.id.to_string());
            }
            Expr::Tuple(ExprTuple { elts, .. }) | Expr::List(ExprList { elts, .. }) => {
                for elt in elts {
                    self.collect_target(elt);
                }
            }
            Expr::Starred(starred) => self.collect_target(&starred.value),
            _ => {}
        }
    }
}

/// Extract a list of string literals from a List or Tuple expression
fn extract_string_list(expr: &Expr) -> Option<Vec<String>> {
    let (Expr::List(ExprList { elts, .. }) | Expr::Tuple(ExprTuple { elts, .. })) = expr else {
        return None;
    };

    elts.iter()
        .map(|elt| match elt {
            Expr::StringLiteral(ExprStringLiteral { value, .. }) => Some(value.to_str().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ruff_python_parser::parse_module;

    use super::*;

    fn analyze(code: &str) -> ModuleExports {
        let parsed = parse_module(code).expect("Failed to parse test module");
        ExportCollector::analyze(&parsed.syntax().body)
    }

    #[test]
    fn test_top_level_definitions() {
        let exports = analyze(
            r#"
PI = 3.14
a, (b, *rest) = 1, (2, 3)
count: int = 0

def add(x, y):
    inner = x + y
    return inner

class Calculator:
    factor = 2
"#,
        );

        let names: Vec<&str> = exports.names.iter().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["PI", "a", "b", "rest", "count", "add", "Calculator"]
        );
        assert!(!exports.contains("inner"));
        assert!(!exports.contains("factor"));
    }

    #[test]
    fn test_conditional_definitions_are_collected() {
        let exports = analyze(
            r#"
try:
    from fast import loads
except ImportError:
    def loads(text):
        return text

if DEBUG:
    LEVEL = 10
else:
    LEVEL = 20
"#,
        );

        assert!(exports.contains("loads"));
        assert!(exports.contains("LEVEL"));
    }

    #[test]
    fn test_import_bindings() {
        let exports = analyze(
            r#"
import os.path
import numpy as np
from collections import OrderedDict as OD, deque
from helpers import *

def build():
    import json
"#,
        );

        let names: Vec<&str> = exports.names.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["os", "np", "OD", "deque", "build"]);
    }

    #[test]
    fn test_literal_all() {
        let exports = analyze("__all__ = ('foo', 'bar')\n");
        assert_eq!(
            exports.all,
            Some(vec!["foo".to_string(), "bar".to_string()])
        );
    }

    #[test]
    fn test_dynamic_all_is_ignored() {
        let exports = analyze("__all__ = [name for name in dir()]\n");
        assert_eq!(exports.all, None);
        assert!(exports.contains("__all__"));
    }
}
