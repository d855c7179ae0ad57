//! Standard library detection
//!
//! Single source of truth for deciding whether an external specifier belongs to
//! the Python standard library. Backed by ruff's curated module list, so no
//! interpreter is consulted.

use ruff_python_stdlib::sys;

/// Top-level package of a dotted module name (`os.path` -> `os`)
pub fn top_level_package(module_name: &str) -> &str {
    module_name
        .trim_start_matches('.')
        .split('.')
        .next()
        .unwrap_or(module_name)
}

/// Check if a module name represents a Python standard library module
///
/// Both direct matches and submodules are recognized (`os` and `os.path`).
/// `python_version` is the minor version of Python 3 (`10` for 3.10).
pub fn is_stdlib_module(module_name: &str, python_version: u8) -> bool {
    // Not part of ruff's list but always present
    if module_name == "__future__" {
        return true;
    }

    if sys::is_known_standard_library(python_version, module_name) {
        return true;
    }

    let top_level = top_level_package(module_name);
    top_level != module_name && sys::is_known_standard_library(python_version, top_level)
}
