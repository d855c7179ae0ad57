use std::path::PathBuf;

use etcetera::{BaseStrategy, choose_base_strategy};

/// Per-user configuration directory for bindle (`~/.config/bindle` on Linux)
pub fn user_config_dir() -> Option<PathBuf> {
    choose_base_strategy()
        .ok()
        .map(|strategy| strategy.config_dir().join("bindle"))
}

/// Location of the per-user `bindle.toml`, whether or not it exists
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join("bindle.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_config_file_lives_in_bindle_dir() {
        if let Some(file) = user_config_file() {
            assert!(file.ends_with("bindle/bindle.toml"));
        }
    }
}
