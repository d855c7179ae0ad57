//! Import discovery visitor that finds all imports in a Python module,
//! including those nested within functions, classes, and other blocks.

use std::fmt;

use ruff_python_ast::{
    Alias, Stmt, StmtImport, StmtImportFrom,
    visitor::{Visitor, walk_stmt},
};

/// Whether an import binds a whole module or pulls names out of one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import module` / `import module as alias`
    Module,
    /// `from module import name`
    From,
}

/// A single import specifier as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    pub kind: ImportKind,
    /// Module path, relative specifiers keep their leading dots (`..pkg`)
    pub module: String,
    /// Names being imported (for from imports)
    pub names: Vec<(String, Option<String>)>, // (name, alias)
    /// Alias of a whole-module import
    pub alias: Option<String>,
    /// Whether the statement sits directly in the module body
    pub top_level: bool,
}

impl ImportSpecifier {
    /// One alias of an `import a, b as c` statement
    pub fn for_alias(alias: &Alias, top_level: bool) -> Self {
        Self {
            kind: ImportKind::Module,
            module: alias.name.to_string(),
            names: Vec::new(),
            alias: alias.asname.as_ref().map(ToString::to_string),
            top_level,
        }
    }

    pub fn for_import_from(stmt: &StmtImportFrom, top_level: bool) -> Self {
        Self {
            kind: ImportKind::From,
            module: from_import_module(stmt),
            names: stmt
                .names
                .iter()
                .map(|alias| {
                    (
                        alias.name.to_string(),
                        alias.asname.as_ref().map(ToString::to_string),
                    )
                })
                .collect(),
            alias: None,
            top_level,
        }
    }

    pub fn is_star(&self) -> bool {
        self.names.iter().any(|(name, _)| name == "*")
    }

    /// The dotted name this import binds in the importing file, if any.
    ///
    /// `import a.b` binds `a.b` for the purposes of qualified access,
    /// `import a.b as c` binds `c`.
    pub fn bound_name(&self) -> Option<&str> {
        match self.kind {
            ImportKind::Module => Some(self.alias.as_deref().unwrap_or(&self.module)),
            ImportKind::From => None,
        }
    }

    /// Specifier of a name imported from this module when treated as a submodule
    pub fn submodule_specifier(&self, name: &str) -> String {
        if self.module.ends_with('.') {
            format!("{}{name}", self.module)
        } else {
            format!("{}.{name}", self.module)
        }
    }
}

impl fmt::Display for ImportSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ImportKind::Module => {
                write!(f, "import {}", self.module)?;
                if let Some(alias) = &self.alias {
                    write!(f, " as {alias}")?;
                }
                Ok(())
            }
            ImportKind::From => {
                let names: Vec<String> = self
                    .names
                    .iter()
                    .map(|(name, alias)| match alias {
                        Some(alias) => format!("{name} as {alias}"),
                        None => name.clone(),
                    })
                    .collect();
                write!(f, "from {} import {}", self.module, names.join(", "))
            }
        }
    }
}

/// Visitor that collects every import specifier of a module in source order
#[derive(Debug, Default)]
pub struct ImportDiscoveryVisitor {
    imports: Vec<ImportSpecifier>,
    depth: usize,
}

impl ImportDiscoveryVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the imports of a module body
    pub fn discover(body: &[Stmt]) -> Vec<ImportSpecifier> {
        let mut visitor = Self::new();
        visitor.visit_body(body);
        visitor.imports
    }

    fn record_import(&mut self, stmt: &StmtImport) {
        let top_level = self.depth == 0;
        self.imports.extend(
            stmt.names
                .iter()
                .map(|alias| ImportSpecifier::for_alias(alias, top_level)),
        );
    }

    fn record_import_from(&mut self, stmt: &StmtImportFrom) {
        self.imports
            .push(ImportSpecifier::for_import_from(stmt, self.depth == 0));
    }
}

/// Module path of a from-import including its relative dots
pub fn from_import_module(stmt: &StmtImportFrom) -> String {
    let dots = ".".repeat(stmt.level as usize);
    match &stmt.module {
        Some(module) => format!("{dots}{module}"),
        None => dots,
    }
}

impl<'a> Visitor<'a> for ImportDiscoveryVisitor {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(import_stmt) => self.record_import(import_stmt),
            Stmt::ImportFrom(import_from) => self.record_import_from(import_from),
            _ => {
                self.depth += 1;
                walk_stmt(self, stmt);
                self.depth -= 1;
            }
        }
    }
}
