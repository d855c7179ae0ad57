//! Import analysis and reference rewriting
//!
//! [`ImportAnalysis`] decides, once per file, what each import statement
//! means for the bundle: internal children to inline, external imports to
//! hoist into the header, and which dotted names are bound to internal files.
//!
//! [`ReferenceRewriter`] then applies those decisions to the syntax tree:
//!
//! - import statements of internal modules are removed at any depth;
//! - top-level external imports are removed, their text lives in the header;
//! - `module.name` becomes `name` when `module` is bound to an internal file
//!   that defines `name` at top level.
//!
//! The attribute rewrite matches identifier text only, so a local variable
//! shadowing an internal module binding is rewritten as well.

use std::{
    cell::Cell,
    path::{Path, PathBuf},
};

use log::trace;
use ruff_python_ast::{
    ExceptHandler, Expr, ExprContext, ModModule, Stmt, StmtImport, StmtImportFrom,
    visitor::transformer::{Transformer, walk_expr},
};
use rustc_hash::FxHashMap;

use crate::{
    ast_builder,
    cache::ExternalImport,
    export_table::ExportTable,
    resolver::{ModuleResolution, ModuleResolver},
    visitors::{ImportKind, ImportSpecifier},
};

/// How a from-import resolves
#[derive(Debug, Default)]
struct FromImportResolution {
    /// The module itself is a project file
    module: Option<PathBuf>,
    /// Relative module with no file
    unresolved_module: bool,
    /// Imported names that are project submodules, by bound name
    submodules: Vec<(String, String, PathBuf)>,
    /// Every imported name is a project submodule
    all_names_submodules: bool,
}

impl FromImportResolution {
    fn resolve(import: &ImportSpecifier, origin: &Path, resolver: &ModuleResolver) -> Self {
        let mut resolution = Self::default();
        match resolver.resolve(&import.module, origin) {
            ModuleResolution::Internal(path) => resolution.module = Some(path),
            ModuleResolution::Unresolved => resolution.unresolved_module = true,
            ModuleResolution::External => {}
        }

        if import.is_star() {
            return resolution;
        }

        for (name, alias) in &import.names {
            let submodule = import.submodule_specifier(name);
            if let ModuleResolution::Internal(path) = resolver.resolve(&submodule, origin) {
                let bound = alias.clone().unwrap_or_else(|| name.clone());
                resolution.submodules.push((name.clone(), bound, path));
            }
        }
        resolution.all_names_submodules =
            !import.names.is_empty() && resolution.submodules.len() == import.names.len();
        resolution
    }

    fn is_internal(&self) -> bool {
        self.module.is_some() || self.unresolved_module || self.all_names_submodules
    }

    fn is_submodule(&self, name: &str) -> bool {
        self.submodules.iter().any(|(imported, _, _)| imported == name)
    }

    /// Nothing at all backs the statement
    fn is_unresolved(&self) -> bool {
        self.unresolved_module && !self.all_names_submodules
    }
}

/// What a file's imports resolve to
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportAnalysis {
    /// Internal files to bundle before this one, first occurrence order
    pub children: Vec<PathBuf>,
    /// Top-level external imports, hoisted into the header
    pub externals: Vec<ExternalImport>,
    /// Dotted names bound to internal files (`helpers`, `pkg.helpers`, aliases)
    pub bindings: FxHashMap<String, PathBuf>,
    /// Relative specifiers with no matching file
    pub unresolved: Vec<String>,
    /// Number of specifiers that resolved internally
    pub resolved: usize,
}

impl ImportAnalysis {
    pub fn analyze(imports: &[ImportSpecifier], origin: &Path, resolver: &ModuleResolver) -> Self {
        let mut analysis = Self::default();

        for import in imports {
            match import.kind {
                ImportKind::Module => match resolver.resolve(&import.module, origin) {
                    ModuleResolution::Internal(path) => {
                        if let Some(bound) = import.bound_name() {
                            analysis.bindings.insert(bound.to_string(), path.clone());
                        }
                        analysis.add_child(path);
                    }
                    ModuleResolution::Unresolved => analysis.unresolved.push(import.module.clone()),
                    ModuleResolution::External => analysis.add_external(import, resolver),
                },
                ImportKind::From => {
                    let resolution = FromImportResolution::resolve(import, origin, resolver);
                    if !resolution.is_internal() {
                        analysis.add_external(import, resolver);
                        continue;
                    }
                    if resolution.is_unresolved() {
                        analysis.unresolved.push(import.module.clone());
                    }
                    if let Some(path) = resolution.module {
                        analysis.add_child(path);
                    }
                    for (_, bound, path) in resolution.submodules {
                        analysis.bindings.insert(bound, path.clone());
                        analysis.add_child(path);
                    }
                }
            }
        }

        analysis
    }

    fn add_child(&mut self, path: PathBuf) {
        self.resolved += 1;
        if !self.children.contains(&path) {
            self.children.push(path);
        }
    }

    fn add_external(&mut self, import: &ImportSpecifier, resolver: &ModuleResolver) {
        // Nested imports stay where they are
        if !import.top_level {
            return;
        }
        self.externals.push(ExternalImport {
            statement: import.to_string(),
            module: import.module.clone(),
            origin: resolver.classify(&import.module),
        });
    }
}

/// Counts of what a rewrite changed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteSummary {
    pub removed_imports: usize,
    pub rewritten_references: usize,
}

#[derive(Debug)]
pub struct ReferenceRewriter<'a> {
    origin: &'a Path,
    resolver: &'a ModuleResolver,
    exports: &'a ExportTable,
    bindings: &'a FxHashMap<String, PathBuf>,
    removed_imports: Cell<usize>,
    rewritten_references: Cell<usize>,
}

impl<'a> ReferenceRewriter<'a> {
    pub fn new(
        origin: &'a Path,
        resolver: &'a ModuleResolver,
        exports: &'a ExportTable,
        analysis: &'a ImportAnalysis,
    ) -> Self {
        Self {
            origin,
            resolver,
            exports,
            bindings: &analysis.bindings,
            removed_imports: Cell::new(0),
            rewritten_references: Cell::new(0),
        }
    }

    /// Rewrite a module in place
    pub fn rewrite(&self, module: &mut ModModule) -> RewriteSummary {
        self.rewrite_body(&mut module.body, true);
        if !self.bindings.is_empty() {
            self.visit_body(&mut module.body);
        }

        RewriteSummary {
            removed_imports: self.removed_imports.get(),
            rewritten_references: self.rewritten_references.get(),
        }
    }

    fn rewrite_body(&self, body: &mut Vec<Stmt>, top_level: bool) {
        let original = std::mem::take(body);
        let was_empty = original.is_empty();

        for mut stmt in original {
            match stmt {
                Stmt::Import(import) => body.extend(self.rewrite_import(import, top_level)),
                Stmt::ImportFrom(import_from) => {
                    body.extend(self.rewrite_import_from(import_from, top_level));
                }
                _ => {
                    self.rewrite_nested_bodies(&mut stmt);
                    body.push(stmt);
                }
            }
        }

        // A block cannot be empty
        if body.is_empty() && !was_empty && !top_level {
            body.push(ast_builder::pass());
        }
    }

    fn rewrite_nested_bodies(&self, stmt: &mut Stmt) {
        match stmt {
            Stmt::FunctionDef(func_def) => self.rewrite_body(&mut func_def.body, false),
            Stmt::ClassDef(class_def) => self.rewrite_body(&mut class_def.body, false),
            Stmt::If(if_stmt) => {
                self.rewrite_body(&mut if_stmt.body, false);
                for clause in &mut if_stmt.elif_else_clauses {
                    self.rewrite_body(&mut clause.body, false);
                }
            }
            Stmt::For(for_stmt) => {
                self.rewrite_body(&mut for_stmt.body, false);
                self.rewrite_body(&mut for_stmt.orelse, false);
            }
            Stmt::While(while_stmt) => {
                self.rewrite_body(&mut while_stmt.body, false);
                self.rewrite_body(&mut while_stmt.orelse, false);
            }
            Stmt::With(with_stmt) => self.rewrite_body(&mut with_stmt.body, false),
            Stmt::Try(try_stmt) => {
                self.rewrite_body(&mut try_stmt.body, false);
                for handler in &mut try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    self.rewrite_body(&mut handler.body, false);
                }
                self.rewrite_body(&mut try_stmt.orelse, false);
                self.rewrite_body(&mut try_stmt.finalbody, false);
            }
            Stmt::Match(match_stmt) => {
                for case in &mut match_stmt.cases {
                    self.rewrite_body(&mut case.body, false);
                }
            }
            _ => {}
        }
    }

    /// Keep only the aliases that stay in place
    fn rewrite_import(&self, mut import: StmtImport, top_level: bool) -> Option<Stmt> {
        let before = import.names.len();
        import.names.retain(|alias| {
            let specifier = ImportSpecifier::for_alias(alias, top_level);
            match self.resolver.resolve(&specifier.module, self.origin) {
                ModuleResolution::Internal(_) | ModuleResolution::Unresolved => false,
                ModuleResolution::External => !top_level,
            }
        });
        self.removed_imports
            .set(self.removed_imports.get() + before - import.names.len());

        if import.names.is_empty() {
            None
        } else {
            Some(Stmt::Import(import))
        }
    }

    /// Remove the statement, or keep it when it stays external and nested.
    ///
    /// Aliased names of an internal module are rebound with an assignment.
    fn rewrite_import_from(&self, import_from: StmtImportFrom, top_level: bool) -> Vec<Stmt> {
        let specifier = ImportSpecifier::for_import_from(&import_from, top_level);
        let resolution = FromImportResolution::resolve(&specifier, self.origin, self.resolver);

        if !resolution.is_internal() {
            if top_level {
                self.removed_imports.set(self.removed_imports.get() + 1);
                return Vec::new();
            }
            return vec![Stmt::ImportFrom(import_from)];
        }

        self.removed_imports.set(self.removed_imports.get() + 1);
        if resolution.module.is_none() {
            return Vec::new();
        }

        specifier
            .names
            .iter()
            .filter(|(name, _)| !resolution.is_submodule(name))
            .filter_map(|(name, alias)| {
                let alias = alias.as_deref().filter(|alias| alias != name)?;
                trace!("Rebinding {alias} = {name} in {}", self.origin.display());
                Some(ast_builder::simple_assign(
                    alias,
                    ast_builder::name(name, ExprContext::Load),
                ))
            })
            .collect()
    }

    /// Bare name replacing `expr`, if it is a qualified internal reference
    fn qualified_replacement(&self, expr: &Expr) -> Option<String> {
        let Expr::Attribute(attribute) = expr else {
            return None;
        };
        if attribute.ctx != ExprContext::Load {
            return None;
        }
        let chain = dotted_chain(&attribute.value)?;
        let target = self.bindings.get(&chain)?;
        self.exports
            .exports(target, attribute.attr.as_str())
            .then(|| attribute.attr.to_string())
    }
}

impl Transformer for ReferenceRewriter<'_> {
    fn visit_expr(&self, expr: &mut Expr) {
        if let Some(name) = self.qualified_replacement(expr) {
            *expr = ast_builder::name(&name, ExprContext::Load);
            self.rewritten_references
                .set(self.rewritten_references.get() + 1);
            return;
        }
        walk_expr(self, expr);
    }
}

/// `a.b.c` for a chain of attribute accesses rooted at a name
fn dotted_chain(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(name) => Some(name.id.to_string()),
        Expr::Attribute(attribute) => {
            let mut chain = dotted_chain(&attribute.value)?;
            chain.push('.');
            chain.push_str(attribute.attr.as_str());
            Some(chain)
        }
        _ => None,
    }
}
