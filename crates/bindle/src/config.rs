//! Layered configuration
//!
//! Sources, lowest precedence first: built-in defaults, the per-user
//! `bindle.toml`, `[tool.bindle]` in the project's `pyproject.toml`, the
//! project's `bindle.toml`, an explicit `--config` file, then command-line
//! overrides. Every source is a [`ConfigLayer`] whose set fields replace the
//! values below it.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use log::debug;
use serde::Deserialize;

use crate::dirs;

pub const DEFAULT_PYTHON_VERSION: u8 = 10;
pub const DEFAULT_RETAIN_PREFIX: &str = "_";
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    "node_modules",
    "build",
    "dist",
];

pub const PROJECT_CONFIG_FILE: &str = "bindle.toml";
pub const PYPROJECT_FILE: &str = "pyproject.toml";

/// Effective configuration of a bundling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Minor version of Python 3 used for standard-library classification
    pub python_version: u8,
    /// Modules always classified as third-party
    pub known_third_party: IndexSet<String>,
    /// Top-level functions starting with this prefix survive dead-code elimination
    pub retain_prefix: String,
    pub dead_code_elimination: bool,
    pub constant_folding: bool,
    /// Replace `if` statements on literal conditions by the branch taken
    pub constant_condition_pruning: bool,
    /// Worker threads; `None` uses rayon's default
    pub jobs: Option<usize>,
    /// Directory names skipped by the project pre-scan
    pub exclude: IndexSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python_version: DEFAULT_PYTHON_VERSION,
            known_third_party: IndexSet::new(),
            retain_prefix: DEFAULT_RETAIN_PREFIX.to_string(),
            dead_code_elimination: true,
            constant_folding: true,
            constant_condition_pruning: true,
            jobs: None,
            exclude: DEFAULT_EXCLUDES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Python version as written in a config file: `11` or `"3.11"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PythonVersion {
    Minor(u8),
    Text(String),
}

impl PythonVersion {
    pub fn minor(&self) -> Result<u8> {
        match self {
            Self::Minor(minor) => Ok(*minor),
            Self::Text(text) => {
                let minor = text.strip_prefix("3.").unwrap_or(text);
                minor
                    .parse()
                    .with_context(|| format!("invalid python_version `{text}`, expected `3.N`"))
            }
        }
    }
}

/// One configuration source; unset fields leave lower layers untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub python_version: Option<PythonVersion>,
    pub known_third_party: Option<Vec<String>>,
    pub retain_prefix: Option<String>,
    pub dead_code_elimination: Option<bool>,
    pub constant_folding: Option<bool>,
    pub constant_condition_pruning: Option<bool>,
    pub jobs: Option<usize>,
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    tool: Option<PyProjectTools>,
}

#[derive(Debug, Default, Deserialize)]
struct PyProjectTools {
    bindle: Option<ConfigLayer>,
}

impl ConfigLayer {
    /// Parse a `bindle.toml` document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a `bindle.toml` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Read the `[tool.bindle]` table of a `pyproject.toml`, if present
    pub fn from_pyproject(path: &Path) -> Result<Option<Self>> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let pyproject: PyProject = toml::from_str(&text)
            .with_context(|| format!("invalid [tool.bindle] table in {}", path.display()))?;
        Ok(pyproject.tool.and_then(|tools| tools.bindle))
    }
}

impl Config {
    /// Load configuration for a project, including the per-user config file
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let user_config = dirs::user_config_file();
        Self::load_layers(user_config.as_deref(), project_root, explicit)
    }

    /// Load configuration from an explicit set of locations
    pub fn load_layers(
        user_config: Option<&Path>,
        project_root: &Path,
        explicit: Option<&Path>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = user_config.filter(|path| path.is_file()) {
            debug!("Loading user config from {}", path.display());
            config.merge(ConfigLayer::from_file(path)?)?;
        }

        let pyproject = project_root.join(PYPROJECT_FILE);
        if pyproject.is_file()
            && let Some(layer) = ConfigLayer::from_pyproject(&pyproject)?
        {
            debug!("Loading [tool.bindle] from {}", pyproject.display());
            config.merge(layer)?;
        }

        let project_config = project_root.join(PROJECT_CONFIG_FILE);
        if project_config.is_file() {
            debug!("Loading project config from {}", project_config.display());
            config.merge(ConfigLayer::from_file(&project_config)?)?;
        }

        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("config file {} does not exist", path.display());
            }
            debug!("Loading explicit config from {}", path.display());
            config.merge(ConfigLayer::from_file(path)?)?;
        }

        Ok(config)
    }

    /// Apply a layer on top of the current values
    pub fn merge(&mut self, layer: ConfigLayer) -> Result<()> {
        if let Some(version) = layer.python_version {
            self.python_version = version.minor()?;
        }
        if let Some(known) = layer.known_third_party {
            self.known_third_party = known.into_iter().collect();
        }
        if let Some(prefix) = layer.retain_prefix {
            self.retain_prefix = prefix;
        }
        if let Some(enabled) = layer.dead_code_elimination {
            self.dead_code_elimination = enabled;
        }
        if let Some(enabled) = layer.constant_folding {
            self.constant_folding = enabled;
        }
        if let Some(enabled) = layer.constant_condition_pruning {
            self.constant_condition_pruning = enabled;
        }
        if let Some(jobs) = layer.jobs {
            if jobs == 0 {
                bail!("jobs must be at least 1");
            }
            self.jobs = Some(jobs);
        }
        if let Some(exclude) = layer.exclude {
            self.exclude = exclude.into_iter().collect();
        }
        Ok(())
    }

    pub fn is_excluded(&self, dir_name: &str) -> bool {
        self.exclude.contains(dir_name)
    }
}
