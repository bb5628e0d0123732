//! Platform configuration and log paths

use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "atcase";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/atcase/`
/// - macOS: `~/Library/Application Support/atcase/`
/// - Windows: `%APPDATA%\atcase\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("config.toml"));
        }
    }

    #[test]
    fn test_log_dir_is_under_app_dir() {
        if let Some(dir) = log_dir() {
            assert!(dir.ends_with("logs"));
        }
    }
}
