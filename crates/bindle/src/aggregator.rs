//! External import aggregation
//!
//! Every bundled file registers its top-level external imports here. The
//! aggregator deduplicates them by rendered statement and produces the import
//! header of the bundle: standard library first, then third-party.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::trace;
use parking_lot::Mutex;

use crate::{
    cache::ExternalImport,
    resolver::{ImportOrigin, ModuleResolver},
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct AggregatedImport {
    module: String,
    /// File that first contributed the statement
    origin_file: PathBuf,
}

#[derive(Debug, Default)]
struct Sections {
    builtin: IndexMap<String, AggregatedImport>,
    third_party: IndexMap<String, AggregatedImport>,
}

#[derive(Debug, Default)]
pub struct ImportAggregator {
    sections: Mutex<Sections>,
}

impl ImportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an import; returns whether the statement was new
    pub fn add(&self, import: &ExternalImport, origin_file: &Path) -> bool {
        let mut sections = self.sections.lock();
        let section = match import.origin {
            ImportOrigin::Builtin => &mut sections.builtin,
            ImportOrigin::ThirdParty => &mut sections.third_party,
        };
        if section.contains_key(&import.statement) {
            return false;
        }
        trace!("Aggregating `{}` ({})", import.statement, import.origin);
        section.insert(
            import.statement.clone(),
            AggregatedImport {
                module: import.module.clone(),
                origin_file: origin_file.to_path_buf(),
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        let sections = self.sections.lock();
        sections.builtin.len() + sections.third_party.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the import header; empty when there is nothing to import
    pub fn render(&self, resolver: &ModuleResolver) -> String {
        let sections = self.sections.lock();
        let mut blocks = Vec::new();

        let builtin = Self::render_section(&sections.builtin, resolver);
        if !builtin.is_empty() {
            blocks.push(format!("# Standard library imports\n{}", builtin.join("\n")));
        }
        let third_party = Self::render_section(&sections.third_party, resolver);
        if !third_party.is_empty() {
            blocks.push(format!("# Third-party imports\n{}", third_party.join("\n")));
        }

        blocks.join("\n\n")
    }

    /// `__future__` statements first, the rest sorted
    fn render_section(
        entries: &IndexMap<String, AggregatedImport>,
        resolver: &ModuleResolver,
    ) -> Vec<String> {
        let (mut future, mut rest): (Vec<&String>, Vec<&String>) = entries
            .iter()
            .filter(|(_, entry)| {
                // A module that turned out to be a project file is bundled, not imported
                resolver
                    .resolve(&entry.module, &entry.origin_file)
                    .is_external()
            })
            .map(|(statement, _)| statement)
            .partition(|statement| statement.starts_with("from __future__ "));
        future.sort();
        rest.sort();
        future.into_iter().chain(rest).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use insta::assert_snapshot;
    use tempfile::TempDir;

    use super::*;
    use crate::{config::Config, resolver::NoPackageProbe};

    fn external(statement: &str, module: &str, origin: ImportOrigin) -> ExternalImport {
        ExternalImport {
            statement: statement.to_string(),
            module: module.to_string(),
            origin,
        }
    }

    #[test]
    fn test_render_sections() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        let main = root.join("main.py");
        fs::write(&main, "")?;
        let resolver =
            ModuleResolver::new(&root, &Config::default()).with_probe(Box::new(NoPackageProbe));

        let aggregator = ImportAggregator::new();
        aggregator.add(&external("import sys", "sys", ImportOrigin::Builtin), &main);
        aggregator.add(&external("import requests", "requests", ImportOrigin::ThirdParty), &main);
        aggregator.add(
            &external("from __future__ import annotations", "__future__", ImportOrigin::Builtin),
            &main,
        );
        aggregator.add(&external("import os", "os", ImportOrigin::Builtin), &main);
        assert!(!aggregator.add(&external("import sys", "sys", ImportOrigin::Builtin), &main));

        assert_eq!(aggregator.len(), 4);
        assert_snapshot!(aggregator.render(&resolver), @r"
        # Standard library imports
        from __future__ import annotations
        import os
        import sys

        # Third-party imports
        import requests
        ");
        Ok(())
    }

    #[test]
    fn test_empty_sections_are_omitted() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        let main = root.join("main.py");
        let resolver =
            ModuleResolver::new(&root, &Config::default()).with_probe(Box::new(NoPackageProbe));

        let aggregator = ImportAggregator::new();
        assert_eq!(aggregator.render(&resolver), "");

        aggregator.add(&external("import numpy as np", "numpy", ImportOrigin::ThirdParty), &main);
        assert_eq!(aggregator.render(&resolver), "# Third-party imports\nimport numpy as np");
        Ok(())
    }

    #[test]
    fn test_internal_modules_are_excluded_at_render() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        let main = root.join("main.py");
        fs::write(&main, "")?;
        let resolver =
            ModuleResolver::new(&root, &Config::default()).with_probe(Box::new(NoPackageProbe));

        let aggregator = ImportAggregator::new();
        aggregator.add(&external("import config", "config", ImportOrigin::ThirdParty), &main);
        // The module appears in the project after registration
        fs::write(root.join("config.py"), "DEBUG = False\n")?;

        assert_eq!(aggregator.render(&resolver), "");
        Ok(())
    }
}
