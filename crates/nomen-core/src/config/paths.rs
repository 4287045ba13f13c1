//! Path utilities for nomen configuration and data files

use std::path::PathBuf;

/// Root directory for nomen data
///
/// Returns: `~/.local/share/nomen` (platform equivalent via `dirs`)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nomen")
}

/// Default settings file path
///
/// Returns: `~/.config/nomen/settings.yaml` (platform equivalent)
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nomen")
        .join("settings.yaml")
}

/// Default repository database path
pub fn default_db_path() -> PathBuf {
    default_data_dir().join("repository.db")
}

/// Default location of the UCS taxonomy sheet
pub fn default_taxonomy_path() -> PathBuf {
    default_data_dir().join("ucs.csv")
}
