//! Folding of literal additions and multiplications

use std::cell::Cell;

use anyhow::Result;
use ruff_python_ast::{
    Expr, ExprBinOp, ModModule, Number, Operator,
    visitor::transformer::{Transformer, walk_expr},
};

use super::{OptimizationPass, PassContext};
use crate::ast_builder;

/// Longest string a repetition may produce
const MAX_FOLDED_STRING_LEN: usize = 4096;

/// Replaces `literal + literal` and `literal * literal` by their value.
///
/// Folding is bottom-up, so `2 * 3 + 1` becomes `7`. Anything Python would
/// reject at runtime, or that would overflow 64 bits, stays as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantFolding;

impl OptimizationPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&self, module: &mut ModModule, _context: &PassContext<'_>) -> Result<usize> {
        let folder = Folder::default();
        folder.visit_body(&mut module.body);
        Ok(folder.folded.get())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Constant {
    Int(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Constant {
    fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::NumberLiteral(number) => match &number.value {
                Number::Int(int) => int.as_u64().map(Self::Int),
                Number::Float(float) => Some(Self::Float(*float)),
                Number::Complex { .. } => None,
            },
            Expr::BooleanLiteral(boolean) => Some(Self::Bool(boolean.value)),
            Expr::StringLiteral(string) => Some(Self::Str(string.value.to_str().to_string())),
            _ => None,
        }
    }

    fn into_expr(self) -> Expr {
        match self {
            Self::Int(value) => ast_builder::int_literal(value),
            Self::Float(value) => ast_builder::float_literal(value),
            Self::Bool(value) => ast_builder::bool_literal(value),
            Self::Str(value) => ast_builder::string_literal(&value),
        }
    }

    /// Integer value, with `bool` behaving as `int`
    fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(value) => Some(u64::from(*value)),
            Self::Float(_) | Self::Str(_) => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(_) | Self::Bool(_) => self.as_int().map(|value| value as f64),
            Self::Str(_) => None,
        }
    }
}

fn finite(value: f64) -> Option<Constant> {
    value.is_finite().then_some(Constant::Float(value))
}

fn add(left: &Constant, right: &Constant) -> Option<Constant> {
    match (left, right) {
        (Constant::Str(left), Constant::Str(right)) => Some(Constant::Str(format!("{left}{right}"))),
        (Constant::Str(_), _) | (_, Constant::Str(_)) => None,
        (Constant::Float(_), _) | (_, Constant::Float(_)) => {
            finite(left.as_float()? + right.as_float()?)
        }
        _ => left
            .as_int()?
            .checked_add(right.as_int()?)
            .map(Constant::Int),
    }
}

fn multiply(left: &Constant, right: &Constant) -> Option<Constant> {
    match (left, right) {
        (Constant::Str(text), count) | (count, Constant::Str(text)) => {
            let count = usize::try_from(count.as_int()?).ok()?;
            let length = text.len().checked_mul(count)?;
            (length <= MAX_FOLDED_STRING_LEN).then(|| Constant::Str(text.repeat(count)))
        }
        (Constant::Float(_), _) | (_, Constant::Float(_)) => {
            finite(left.as_float()? * right.as_float()?)
        }
        _ => left
            .as_int()?
            .checked_mul(right.as_int()?)
            .map(Constant::Int),
    }
}

#[derive(Debug, Default)]
struct Folder {
    folded: Cell<usize>,
}

impl Folder {
    fn fold(bin_op: &ExprBinOp) -> Option<Constant> {
        let left = Constant::from_expr(&bin_op.left)?;
        let right = Constant::from_expr(&bin_op.right)?;
        match bin_op.op {
            Operator::Add => add(&left, &right),
            Operator::Mult => multiply(&left, &right),
            _ => None,
        }
    }
}

impl Transformer for Folder {
    fn visit_expr(&self, expr: &mut Expr) {
        // Operands first
        walk_expr(self, expr);

        if let Expr::BinOp(bin_op) = expr
            && let Some(constant) = Self::fold(bin_op)
        {
            *expr = constant.into_expr();
            self.folded.set(self.folded.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{export_table::ReferenceIndex, syntax};

    fn fold(source: &str) -> (String, usize) {
        let mut parsed = syntax::parse(source).expect("source should parse");
        let references = ReferenceIndex::default();
        let context = PassContext {
            path: Path::new("mod.py"),
            references: &references,
            retain_prefix: "_",
        };
        let folded = ConstantFolding
            .run(&mut parsed.module, &context)
            .expect("constant folding does not fail");
        (parsed.render(), folded)
    }

    #[test]
    fn test_integer_addition() {
        assert_eq!(fold("x = 2 + 3\n"), ("x = 5".to_string(), 1));
    }

    #[test]
    fn test_nested_expressions_fold_bottom_up() {
        assert_eq!(fold("x = 2 * 3 + 1\n"), ("x = 7".to_string(), 2));
    }

    #[test]
    fn test_mixed_numeric_types() {
        assert_eq!(fold("x = 1 + 2.5\n").0, "x = 3.5");
        assert_eq!(fold("x = True + 1\n").0, "x = 2");
        assert_eq!(fold("x = 2 * 1.5\n").0, "x = 3.0");
    }

    #[test]
    fn test_strings() {
        assert_eq!(fold("x = \"foo\" + \"bar\"\n").0, "x = \"foobar\"");
        assert_eq!(fold("x = \"ab\" * 3\n").0, "x = \"ababab\"");
        assert_eq!(fold("x = 2 * \"ab\"\n").0, "x = \"abab\"");
    }

    #[test]
    fn test_illegal_combinations_are_unchanged() {
        for source in [
            "x = \"a\" + 1",
            "x = \"a\" * 2.0",
            "x = \"a\" * 5000",
            "x = 18446744073709551615 + 1",
            "x = a + 1",
            "x = 2 - 1",
        ] {
            let (output, folded) = fold(source);
            assert_eq!(output, source);
            assert_eq!(folded, 0, "{source}");
        }
    }

    #[test]
    fn test_non_finite_float_is_unchanged() {
        let (output, folded) = fold("x = 1e308 * 10.0\n");
        assert_eq!(folded, 0);
        assert!(output.contains(" * "));
    }
}
