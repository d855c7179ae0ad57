//! AST visitor implementations for bindle
//!
//! Read-only traversals over ruff's syntax tree: import discovery, module-scope
//! export collection and name reference collection.

mod export_collector;
mod import_discovery;
mod reference_collector;

pub use export_collector::{ExportCollector, ModuleExports};
pub use import_discovery::{
    ImportDiscoveryVisitor, ImportKind, ImportSpecifier, from_import_module,
};
pub use reference_collector::ReferenceCollector;
