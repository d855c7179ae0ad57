//! Module resolution
//!
//! Maps an import specifier written in some origin file to a project file, or
//! decides that it names something outside the project. External specifiers
//! are further classified as standard library or third-party for the import
//! header.
//!
//! Resolution results are memoized in concurrent maps because every engine task
//! resolves imports against the same resolver.

use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use dashmap::DashMap;
use indexmap::IndexSet;
use log::{debug, trace, warn};

use crate::{
    config::Config,
    stdlib_detection::{is_stdlib_module, top_level_package},
};

/// Outcome of resolving one specifier from one origin file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleResolution {
    /// A project file, canonicalized
    Internal(PathBuf),
    /// A relative specifier with no matching file
    Unresolved,
    /// Not part of the project
    External,
}

impl ModuleResolution {
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

/// Section of the import header an external import belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportOrigin {
    /// `__future__` and the standard library
    Builtin,
    ThirdParty,
}

impl fmt::Display for ImportOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("standard library"),
            Self::ThirdParty => f.write_str("third-party"),
        }
    }
}

/// Locates a top-level module in the Python environment the bundle targets.
///
/// `None` means the probe cannot tell.
pub trait PackageProbe: fmt::Debug + Send + Sync {
    fn origin(&self, package: &str) -> Option<ImportOrigin>;
}

/// Probe that never has an opinion
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPackageProbe;

impl PackageProbe for NoPackageProbe {
    fn origin(&self, _package: &str) -> Option<ImportOrigin> {
        None
    }
}

/// Top-level modules found in an environment's library directories
#[derive(Debug, Default)]
struct EnvironmentModules {
    /// Beside `site-packages`, in the environment or its base interpreter
    stdlib: IndexSet<String>,
    /// Inside `site-packages`
    installed: IndexSet<String>,
}

/// Probe backed by the library directories of a virtual environment.
///
/// Modules directly under `lib/python3.X/` belong to the interpreter and are
/// standard library; modules under its `site-packages` are third-party. The
/// base interpreter named by `pyvenv.cfg` is searched too, since a virtual
/// environment usually carries nothing but `site-packages`. Directories are
/// scanned once, on first use.
#[derive(Debug)]
pub struct EnvironmentProbe {
    environments: Vec<PathBuf>,
    modules: OnceLock<EnvironmentModules>,
}

const VENV_DIR_NAMES: &[&str] = &[".venv", "venv", "env"];

impl EnvironmentProbe {
    /// Probe a specific virtual environment
    pub fn for_environment(venv: impl Into<PathBuf>) -> Self {
        Self {
            environments: vec![venv.into()],
            modules: OnceLock::new(),
        }
    }

    /// Locate the environments for a project: conventional directories inside
    /// the project, then `VIRTUAL_ENV` when set
    pub fn discover(project_root: &Path) -> Self {
        let mut environments: Vec<PathBuf> = VENV_DIR_NAMES
            .iter()
            .map(|name| project_root.join(name))
            .filter(|path| is_virtualenv(path))
            .collect();
        if let Some(venv) = std::env::var_os("VIRTUAL_ENV").map(PathBuf::from)
            && !environments.contains(&venv)
        {
            environments.push(venv);
        }
        debug!("Python environments for import classification: {environments:?}");

        Self {
            environments,
            modules: OnceLock::new(),
        }
    }

    fn modules(&self) -> &EnvironmentModules {
        self.modules.get_or_init(|| {
            let mut modules = EnvironmentModules::default();
            for venv in &self.environments {
                let prefixes = std::iter::once(venv.clone()).chain(base_prefix(venv));
                for library in prefixes.flat_map(|prefix| library_directories(&prefix)) {
                    scan_library_directory(&library, &mut modules);
                }
            }
            trace!(
                "Found {} interpreter modules and {} installed packages",
                modules.stdlib.len(),
                modules.installed.len()
            );
            modules
        })
    }
}

impl PackageProbe for EnvironmentProbe {
    fn origin(&self, package: &str) -> Option<ImportOrigin> {
        let modules = self.modules();
        // The interpreter's own directories precede site-packages on sys.path
        if modules.stdlib.contains(package) {
            Some(ImportOrigin::Builtin)
        } else if modules.installed.contains(package) {
            Some(ImportOrigin::ThirdParty)
        } else {
            None
        }
    }
}

fn is_virtualenv(path: &Path) -> bool {
    let has_bin = path.join("bin").is_dir() || path.join("Scripts").is_dir();
    let has_lib = path.join("lib").is_dir() || path.join("Lib").is_dir();
    has_bin || has_lib
}

/// Prefix of the interpreter a virtual environment was created from
fn base_prefix(venv: &Path) -> Option<PathBuf> {
    let config = std::fs::read_to_string(venv.join("pyvenv.cfg")).ok()?;
    let home = config.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "home").then(|| PathBuf::from(value.trim()))
    })?;
    // `home` is the directory holding the executable: `<prefix>/bin` on Unix,
    // the prefix itself on Windows
    if home.join("Lib").is_dir() {
        Some(home)
    } else {
        home.parent().map(Path::to_path_buf)
    }
}

/// `lib/python3.X` on Unix, `Lib` on Windows
fn library_directories(prefix: &Path) -> Vec<PathBuf> {
    let mut directories = Vec::new();

    if let Ok(entries) = std::fs::read_dir(prefix.join("lib")) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_python = path
                .file_name()
                .and_then(OsStr::to_str)
                .is_some_and(|name| name.starts_with("python3"));
            if is_python && path.is_dir() {
                directories.push(path);
            }
        }
    }
    directories.sort();

    let windows = prefix.join("Lib");
    if windows.is_dir() {
        directories.push(windows);
    }

    directories
}

fn scan_library_directory(library: &Path, modules: &mut EnvironmentModules) {
    let Ok(entries) = std::fs::read_dir(library) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };

        if name == "site-packages" {
            scan_site_packages_directory(&path, &mut modules.installed);
        } else if path.is_dir() {
            if path.join("__init__.py").is_file() {
                modules.stdlib.insert(name.to_owned());
            }
        } else if let Some(module) = name.strip_suffix(".py") {
            modules.stdlib.insert(module.to_owned());
        }
    }
}

fn scan_site_packages_directory(site_packages: &Path, packages: &mut IndexSet<String>) {
    let Ok(entries) = std::fs::read_dir(site_packages) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };

        // Metadata directories and private helpers are not importable packages
        if name.starts_with('_') || name.ends_with("-info") {
            continue;
        }

        if path.is_dir() {
            packages.insert(name.to_owned());
        } else if let Some(module) = name.strip_suffix(".py") {
            packages.insert(module.to_owned());
        }
    }
}

/// A specifier split into its relative level and dotted name parts
#[derive(Debug)]
struct ImportModuleDescriptor {
    leading_dots: usize,
    name_parts: Vec<String>,
}

impl ImportModuleDescriptor {
    fn from_module_name(name: &str) -> Self {
        let leading_dots = name.chars().take_while(|c| *c == '.').count();
        let name_parts = name[leading_dots..]
            .split('.')
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect();

        Self {
            leading_dots,
            name_parts,
        }
    }

    /// `<base>/<parts>.py` and `<base>/<parts>/__init__.py`, in that order
    fn candidates(&self, base: &Path) -> [PathBuf; 2] {
        let target = self
            .name_parts
            .iter()
            .fold(base.to_path_buf(), |path, part| path.join(part));
        [target.with_extension("py"), target.join("__init__.py")]
    }
}

#[derive(Debug)]
pub struct ModuleResolver {
    root: PathBuf,
    python_version: u8,
    known_third_party: IndexSet<String>,
    probe: Box<dyn PackageProbe>,
    /// Existing candidate files per (origin directory, specifier), in precedence order
    candidates: DashMap<(PathBuf, String), Vec<PathBuf>>,
    classifications: DashMap<String, ImportOrigin>,
}

impl ModuleResolver {
    /// Create a resolver for the project rooted at `root`.
    ///
    /// Specifiers missing from the curated standard-library list are looked up
    /// in the project's Python environment.
    pub fn new(root: &Path, config: &Config) -> Self {
        let root = canonicalize_path(root.to_path_buf());
        let probe = EnvironmentProbe::discover(&root);
        Self {
            probe: Box::new(probe),
            python_version: config.python_version,
            known_third_party: config.known_third_party.clone(),
            candidates: DashMap::new(),
            classifications: DashMap::new(),
            root,
        }
    }

    /// Replace the installed-package probe
    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn PackageProbe>) -> Self {
        self.probe = probe;
        self.classifications.clear();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `specifier` as written in `origin`
    pub fn resolve(&self, specifier: &str, origin: &Path) -> ModuleResolution {
        let Some(origin_dir) = origin.parent() else {
            warn!("Cannot resolve '{specifier}': {} has no parent", origin.display());
            return ModuleResolution::Unresolved;
        };

        let key = (origin_dir.to_path_buf(), specifier.to_string());
        let cached = self.candidates.get(&key).map(|entry| entry.value().clone());
        let candidates = match cached {
            Some(candidates) => candidates,
            None => {
                let found = self.find_candidates(specifier, origin_dir);
                self.candidates.insert(key, found.clone());
                found
            }
        };

        // A file never imports itself
        let resolved = candidates.into_iter().find(|candidate| candidate != origin);
        let resolution = match resolved {
            Some(path) => ModuleResolution::Internal(path),
            None if specifier.starts_with('.') => ModuleResolution::Unresolved,
            None => ModuleResolution::External,
        };
        trace!(
            "Resolved '{specifier}' from {} to {resolution:?}",
            origin.display()
        );
        resolution
    }

    fn find_candidates(&self, specifier: &str, origin_dir: &Path) -> Vec<PathBuf> {
        let descriptor = ImportModuleDescriptor::from_module_name(specifier);

        let paths: Vec<PathBuf> = if descriptor.leading_dots > 0 {
            // One dot is the origin's package, each further dot climbs one level
            let mut base = Some(origin_dir);
            for _ in 1..descriptor.leading_dots {
                base = base.and_then(Path::parent);
            }
            let Some(base) = base else {
                warn!("Relative import '{specifier}' climbs above the filesystem root");
                return Vec::new();
            };
            if descriptor.name_parts.is_empty() {
                vec![base.join("__init__.py")]
            } else {
                descriptor.candidates(base).into()
            }
        } else if descriptor.name_parts.is_empty() {
            Vec::new()
        } else {
            // Origin-relative forms always outrank root-relative ones
            descriptor
                .candidates(origin_dir)
                .into_iter()
                .chain(descriptor.candidates(&self.root))
                .collect()
        };

        let mut existing: Vec<PathBuf> = Vec::new();
        for path in paths.into_iter().filter(|path| path.is_file()) {
            let canonical = canonicalize_path(path);
            if !existing.contains(&canonical) {
                existing.push(canonical);
            }
        }
        existing
    }

    /// Classify an external specifier for the import header
    pub fn classify(&self, specifier: &str) -> ImportOrigin {
        if let Some(cached) = self.classifications.get(specifier) {
            return *cached;
        }

        let origin = self.compute_classification(specifier);
        self.classifications.insert(specifier.to_string(), origin);
        origin
    }

    fn compute_classification(&self, specifier: &str) -> ImportOrigin {
        let package = top_level_package(specifier);

        if specifier == "__future__" {
            return ImportOrigin::Builtin;
        }
        // Explicit configuration beats the curated list
        if self.known_third_party.contains(specifier) || self.known_third_party.contains(package)
        {
            return ImportOrigin::ThirdParty;
        }
        if is_stdlib_module(specifier, self.python_version) {
            return ImportOrigin::Builtin;
        }

        match self.probe.origin(package) {
            Some(origin) => {
                debug!("'{package}' found in the Python environment: {origin}");
                origin
            }
            None => {
                debug!("'{specifier}' is unknown, assuming third-party");
                ImportOrigin::ThirdParty
            }
        }
    }
}

/// Canonicalize a path, falling back to the path itself
fn canonicalize_path(path: PathBuf) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) => {
            warn!("Failed to canonicalize path {}: {e}", path.display());
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;

    fn create_test_file(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn resolver(root: &Path) -> ModuleResolver {
        ModuleResolver::new(root, &Config::default()).with_probe(Box::new(NoPackageProbe))
    }

    #[test]
    fn test_origin_directory_beats_project_root() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("app/main.py"), "import helper")?;
        create_test_file(&root.join("app/helper.py"), "# near")?;
        create_test_file(&root.join("helper.py"), "# far")?;

        let resolver = resolver(root);
        let resolution = resolver.resolve("helper", &root.join("app/main.py").canonicalize()?);

        assert_eq!(
            resolution,
            ModuleResolution::Internal(root.join("app/helper.py").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_file_beats_package_at_same_tier() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("main.py"), "import foo")?;
        create_test_file(&root.join("foo.py"), "# module")?;
        create_test_file(&root.join("foo/__init__.py"), "# package")?;

        let resolver = resolver(root);
        let resolution = resolver.resolve("foo", &root.join("main.py").canonicalize()?);

        assert_eq!(
            resolution,
            ModuleResolution::Internal(root.join("foo.py").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_root_relative_package() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("app/main.py"), "import pkg.helpers")?;
        create_test_file(&root.join("pkg/__init__.py"), "")?;
        create_test_file(&root.join("pkg/helpers.py"), "")?;

        let resolver = resolver(root);
        let origin = root.join("app/main.py").canonicalize()?;

        assert_eq!(
            resolver.resolve("pkg.helpers", &origin),
            ModuleResolution::Internal(root.join("pkg/helpers.py").canonicalize()?)
        );
        assert_eq!(
            resolver.resolve("pkg", &origin),
            ModuleResolution::Internal(root.join("pkg/__init__.py").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_self_import_is_skipped() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("app/json.py"), "import json")?;
        create_test_file(&root.join("app/other.py"), "import json")?;

        let resolver = resolver(root);
        let json_file = root.join("app/json.py").canonicalize()?;

        // From itself the shadowing file is skipped and the stdlib module wins
        assert_eq!(resolver.resolve("json", &json_file), ModuleResolution::External);
        // A sibling sharing the memoized candidates still sees the local file
        assert_eq!(
            resolver.resolve("json", &root.join("app/other.py").canonicalize()?),
            ModuleResolution::Internal(json_file)
        );
        Ok(())
    }

    #[test]
    fn test_relative_imports() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("pkg/__init__.py"), "")?;
        create_test_file(&root.join("pkg/sub/__init__.py"), "")?;
        create_test_file(&root.join("pkg/sub/mod.py"), "from . import sibling")?;
        create_test_file(&root.join("pkg/sub/sibling.py"), "")?;
        create_test_file(&root.join("pkg/util.py"), "")?;

        let resolver = resolver(root);
        let origin = root.join("pkg/sub/mod.py").canonicalize()?;

        assert_eq!(
            resolver.resolve(".sibling", &origin),
            ModuleResolution::Internal(root.join("pkg/sub/sibling.py").canonicalize()?)
        );
        assert_eq!(
            resolver.resolve("..util", &origin),
            ModuleResolution::Internal(root.join("pkg/util.py").canonicalize()?)
        );
        assert_eq!(
            resolver.resolve("..", &origin),
            ModuleResolution::Internal(root.join("pkg/__init__.py").canonicalize()?)
        );
        assert_eq!(
            resolver.resolve(".missing", &origin),
            ModuleResolution::Unresolved
        );
        Ok(())
    }

    #[test]
    fn test_package_init_relative_to_itself_is_unresolved() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("pkg/__init__.py"), "from . import x")?;

        let resolver = resolver(root);
        let origin = root.join("pkg/__init__.py").canonicalize()?;
        assert_eq!(resolver.resolve(".", &origin), ModuleResolution::Unresolved);
        Ok(())
    }

    #[test]
    fn test_external_specifiers() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("main.py"), "import sys")?;

        let resolver = resolver(root);
        let origin = root.join("main.py").canonicalize()?;
        assert_eq!(resolver.resolve("sys", &origin), ModuleResolution::External);
        assert_eq!(resolver.resolve("numpy.linalg", &origin), ModuleResolution::External);
        Ok(())
    }

    #[test]
    fn test_classification() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Config {
            known_third_party: ["attrs".to_string(), "enum".to_string()]
                .into_iter()
                .collect(),
            ..Config::default()
        };
        let resolver =
            ModuleResolver::new(temp_dir.path(), &config).with_probe(Box::new(NoPackageProbe));

        assert_eq!(resolver.classify("__future__"), ImportOrigin::Builtin);
        assert_eq!(resolver.classify("os.path"), ImportOrigin::Builtin);
        assert_eq!(resolver.classify("attrs"), ImportOrigin::ThirdParty);
        assert_eq!(resolver.classify("enum"), ImportOrigin::ThirdParty);
        assert_eq!(resolver.classify("numpy"), ImportOrigin::ThirdParty);
        Ok(())
    }

    #[test]
    fn test_environment_probe() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let venv = temp_dir.path().join(".venv");
        let library = venv.join("lib/python3.12");
        let site_packages = library.join("site-packages");
        create_test_file(&site_packages.join("requests/__init__.py"), "")?;
        create_test_file(&site_packages.join("six.py"), "")?;
        fs::create_dir_all(site_packages.join("requests-2.31.0.dist-info"))?;
        fs::create_dir_all(site_packages.join("_distutils_hack"))?;
        create_test_file(&library.join("vendored_stdlib.py"), "")?;
        create_test_file(&library.join("distro_pkg/__init__.py"), "")?;
        fs::create_dir_all(library.join("lib-dynload"))?;
        // The interpreter's copy shadows an installed one
        create_test_file(&site_packages.join("vendored_stdlib.py"), "")?;

        let probe = EnvironmentProbe::for_environment(&venv);

        assert_eq!(probe.origin("requests"), Some(ImportOrigin::ThirdParty));
        assert_eq!(probe.origin("six"), Some(ImportOrigin::ThirdParty));
        assert_eq!(probe.origin("vendored_stdlib"), Some(ImportOrigin::Builtin));
        assert_eq!(probe.origin("distro_pkg"), Some(ImportOrigin::Builtin));
        assert_eq!(probe.origin("lib-dynload"), None);
        assert_eq!(probe.origin("_distutils_hack"), None);
        assert_eq!(probe.origin("numpy"), None);
        Ok(())
    }

    #[test]
    fn test_base_interpreter_library_is_searched() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let base = temp_dir.path().join("python");
        fs::create_dir_all(base.join("bin"))?;
        create_test_file(&base.join("lib/python3.11/interpreter_only.py"), "")?;
        let venv = temp_dir.path().join("venv");
        create_test_file(
            &venv.join("pyvenv.cfg"),
            &format!("home = {}\nversion = 3.11.9\n", base.join("bin").display()),
        )?;
        create_test_file(&venv.join("lib/python3.11/site-packages/attr/__init__.py"), "")?;

        let probe = EnvironmentProbe::for_environment(&venv);

        assert_eq!(probe.origin("interpreter_only"), Some(ImportOrigin::Builtin));
        assert_eq!(probe.origin("attr"), Some(ImportOrigin::ThirdParty));
        Ok(())
    }

    #[test]
    fn test_environment_decides_unlisted_modules() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let venv = temp_dir.path().join(".venv");
        create_test_file(&venv.join("lib/python3.12/distro_extra.py"), "")?;

        let plain = resolver(temp_dir.path());
        let probed = ModuleResolver::new(temp_dir.path(), &Config::default())
            .with_probe(Box::new(EnvironmentProbe::for_environment(&venv)));

        assert_eq!(plain.classify("distro_extra"), ImportOrigin::ThirdParty);
        assert_eq!(probed.classify("distro_extra.tools"), ImportOrigin::Builtin);
        // The curated list and explicit configuration still come first
        assert_eq!(probed.classify("os"), ImportOrigin::Builtin);
        assert_eq!(probed.classify("numpy"), ImportOrigin::ThirdParty);
        Ok(())
    }
}
