//! Settings file I/O
//!
//! YAML load/save for any serializable settings type. Saves are atomic:
//! the document is written to a temp file in the target directory and
//! renamed over the destination, so a crash mid-write never leaves a
//! truncated settings file behind.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load settings from a YAML file.
///
/// A missing file yields the default settings. An existing file that fails
/// to parse is an error: silently discarding a user's settings document is
/// worse than refusing to start.
pub fn load_settings<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_settings: {:?} does not exist, using defaults", path);
        return Ok(T::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;
    serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse settings file: {:?}", path))
}

/// Save settings to a YAML file atomically.
///
/// Creates parent directories if they don't exist. The temp file lives in
/// the same directory as the destination so the final rename stays on one
/// filesystem.
pub fn save_settings<T>(settings: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;

    let yaml = serde_yaml::to_string(settings).context("Failed to serialize settings")?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
    temp.write_all(yaml.as_bytes())
        .context("Failed to write settings temp file")?;
    temp.flush().context("Failed to flush settings temp file")?;
    temp.as_file()
        .sync_all()
        .context("Failed to sync settings temp file")?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace settings file: {:?}", path))?;

    log::info!("save_settings: wrote {:?}", path);
    Ok(())
}
