//! Factory functions for synthetic AST nodes
//!
//! Nodes created here do not originate from a source file. They carry default
//! ranges and dummy node indices.

use ruff_python_ast::{
    AtomicNodeIndex, Expr, ExprBooleanLiteral, ExprContext, ExprName, ExprNumberLiteral,
    ExprStringLiteral, Int, Number, Stmt, StmtAssign, StmtPass, StringLiteral, StringLiteralFlags,
    StringLiteralValue, name::Name,
};
use ruff_text_size::TextRange;

/// Create a synthetic range for generated nodes
fn synthetic_range() -> TextRange {
    TextRange::default()
}

/// Create a name expression
pub fn name(id: &str, ctx: ExprContext) -> Expr {
    Expr::Name(ExprName {
        node_index: AtomicNodeIndex::dummy(),
        id: Name::new(id),
        ctx,
        range: synthetic_range(),
    })
}

/// Create an integer literal
pub fn int_literal(value: u64) -> Expr {
    Expr::NumberLiteral(ExprNumberLiteral {
        node_index: AtomicNodeIndex::dummy(),
        value: Number::Int(Int::from(value)),
        range: synthetic_range(),
    })
}

/// Create a float literal
pub fn float_literal(value: f64) -> Expr {
    Expr::NumberLiteral(ExprNumberLiteral {
        node_index: AtomicNodeIndex::dummy(),
        value: Number::Float(value),
        range: synthetic_range(),
    })
}

pub fn bool_literal(value: bool) -> Expr {
    Expr::BooleanLiteral(ExprBooleanLiteral {
        node_index: AtomicNodeIndex::dummy(),
        value,
        range: synthetic_range(),
    })
}

/// Create a plain string literal
pub fn string_literal(value: &str) -> Expr {
    Expr::StringLiteral(ExprStringLiteral {
        node_index: AtomicNodeIndex::dummy(),
        value: StringLiteralValue::single(StringLiteral {
            node_index: AtomicNodeIndex::dummy(),
            value: value.into(),
            flags: StringLiteralFlags::empty(),
            range: synthetic_range(),
        }),
        range: synthetic_range(),
    })
}

/// `target = value`
pub fn simple_assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign(StmtAssign {
        node_index: AtomicNodeIndex::dummy(),
        targets: vec![name(target, ExprContext::Store)],
        value: Box::new(value),
        range: synthetic_range(),
    })
}

pub fn pass() -> Stmt {
    Stmt::Pass(StmtPass {
        node_index: AtomicNodeIndex::dummy(),
        range: synthetic_range(),
    })
}
