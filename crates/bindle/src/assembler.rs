//! Bundle assembly
//!
//! Stitches the header docstring, the aggregated import block and the ordered
//! file contributions into the final artifact.

use std::path::Path;

use chrono::{DateTime, Local};

/// Last line of every bundle
pub const FOOTER: &str = "### Made with bindle";

const RULE_WIDTH: usize = 78;

/// Frame one file's transformed body with its source marker
pub fn frame_source(relative_path: &Path, body: &str) -> String {
    let rule = format!("# {}", "=".repeat(RULE_WIDTH));
    // Source markers always use forward slashes
    let display = relative_path
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let mut framed = format!("{rule}\n# Source from: {display}\n{rule}\n");
    framed.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        framed.push('\n');
    }
    framed
}

#[derive(Debug, Clone)]
pub struct BundleAssembler {
    entry_name: String,
    generated_at: DateTime<Local>,
}

impl BundleAssembler {
    pub fn new(entry_name: impl Into<String>) -> Self {
        Self {
            entry_name: entry_name.into(),
            generated_at: Local::now(),
        }
    }

    /// Pin the generation time, for reproducible output
    #[must_use]
    pub fn with_timestamp(mut self, generated_at: DateTime<Local>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn header(&self, file_count: usize, line_count: usize) -> String {
        format!(
            "#!/usr/bin/env python3\n\"\"\"\nGenerated by bindle {version}\n\nGeneration date: \
             {date}\nEntry file: {entry}\nTotal files: {file_count}\nTotal lines: \
             {line_count}\n\nThis is a self-contained Python bundle generated from multiple \
             source files.\n\"\"\"\n",
            version = env!("CARGO_PKG_VERSION"),
            date = self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            entry = self.entry_name,
        )
    }

    /// The complete bundle text.
    ///
    /// `contributions` are already framed and in dependency order; empty ones
    /// (files claimed elsewhere or unreadable) are skipped.
    pub fn assemble(
        &self,
        imports: &str,
        contributions: &[String],
        file_count: usize,
        line_count: usize,
    ) -> String {
        let mut sections = vec![self.header(file_count, line_count)];
        if !imports.is_empty() {
            sections.push(format!("{imports}\n"));
        }
        sections.extend(
            contributions
                .iter()
                .filter(|contribution| !contribution.is_empty())
                .cloned(),
        );
        sections.push(format!("{FOOTER}\n"));
        sections.join("\n")
    }
}
