//! Python syntax front end
//!
//! Parsing goes through `ruff_python_parser` and rendering through
//! `ruff_python_codegen`. The rest of the crate only deals with
//! [`ParsedSource`] and the closed `Stmt`/`Expr` enums of `ruff_python_ast`;
//! node kinds a pass does not inspect are walked through untouched.

use ruff_python_ast::{ModModule, Stmt};
use ruff_python_codegen::{Generator, Indentation, Stylist};
use ruff_python_parser::{ParseError, parse_module};
use ruff_source_file::LineEnding;

/// A parsed module together with the code style detected in its source
#[derive(Debug, Clone)]
pub struct ParsedSource {
    /// The syntax tree. Owned by the task that parsed it.
    pub module: ModModule,
    indentation: Indentation,
    line_ending: LineEnding,
}

/// Parse Python source text into a syntax tree
pub fn parse(source: &str) -> Result<ParsedSource, ParseError> {
    let parsed = parse_module(source)?;
    let stylist = Stylist::from_tokens(parsed.tokens(), source);
    let indentation = stylist.indentation().clone();
    let line_ending = stylist.line_ending();

    Ok(ParsedSource {
        module: parsed.into_syntax(),
        indentation,
        line_ending,
    })
}

impl ParsedSource {
    /// Render the (possibly transformed) tree back to source text
    pub fn render(&self) -> String {
        render_body(&self.module.body, &self.indentation, self.line_ending)
    }
}

/// Render a statement list, separating definitions by a blank line
fn render_body(body: &[Stmt], indentation: &Indentation, line_ending: LineEnding) -> String {
    let mut rendered = String::new();
    let mut previous: Option<&Stmt> = None;

    for stmt in body {
        if let Some(previous) = previous {
            rendered.push_str(line_ending.as_str());
            if is_definition(previous) || is_definition(stmt) {
                rendered.push_str(line_ending.as_str());
            }
        }
        rendered.push_str(&Generator::new(indentation, line_ending).stmt(stmt));
        previous = Some(stmt);
    }

    rendered
}

fn is_definition(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::FunctionDef(_) | Stmt::ClassDef(_))
}
