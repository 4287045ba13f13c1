//! Process-wide settings
//!
//! A single schema-versioned YAML document at a well-known path. Unknown
//! keys round-trip verbatim so settings written by a newer build survive
//! being loaded and re-saved by an older one. Settings mutate only through
//! an explicit update that persists atomically; readers see changes on the
//! next suggestion recomputation.

mod io;
mod paths;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use io::{load_settings, save_settings};
pub use paths::{
    default_data_dir, default_db_path, default_settings_path, default_taxonomy_path,
};

/// Current settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// A user-defined iXML USER-block field shown in the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDef {
    /// Raw USER tag name, `[A-Z0-9_]{1,32}`
    pub tag: String,
    /// Display label
    pub label: String,
}

/// Process-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,

    /// Default CreatorID block for generated filenames
    #[serde(default)]
    pub creator_id: String,

    /// Default SourceID block for generated filenames
    #[serde(default)]
    pub source_id: String,

    #[serde(default)]
    pub library_name: String,

    /// Template applied when deriving the library field, e.g. `"{library} SFX"`
    #[serde(default)]
    pub library_template: String,

    /// Whether newly imported records default to rename-on-save
    #[serde(default)]
    pub rename_on_save_default: bool,

    #[serde(default)]
    pub custom_fields: Vec<CustomFieldDef>,

    /// Keys this build does not know about, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            creator_id: String::new(),
            source_id: String::new(),
            library_name: String::new(),
            library_template: String::new(),
            rename_on_save_default: false,
            custom_fields: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from a path; missing file yields defaults, malformed file errors
    pub fn load(path: &Path) -> Result<Self> {
        load_settings(path)
    }

    /// Persist atomically to a path
    pub fn save(&self, path: &Path) -> Result<()> {
        save_settings(self, path)
    }

    /// Library field value after applying the template, if any
    pub fn library(&self) -> Option<String> {
        if self.library_name.is_empty() {
            return None;
        }
        if self.library_template.is_empty() {
            return Some(self.library_name.clone());
        }
        Some(self.library_template.replace("{library}", &self.library_name))
    }
}

/// Settings plus the place they persist to
///
/// The repository holds one of these; `update` is the only mutation path.
pub struct SettingsStore {
    path: PathBuf,
    current: std::sync::RwLock<Settings>,
}

impl SettingsStore {
    /// Load the store from disk (fatal if an existing document is malformed)
    pub fn open(path: PathBuf) -> Result<Self> {
        let current = Settings::load(&path)?;
        Ok(Self {
            path,
            current: std::sync::RwLock::new(current),
        })
    }

    /// In-memory store with defaults (tests)
    pub fn ephemeral(path: PathBuf) -> Self {
        Self {
            path,
            current: std::sync::RwLock::new(Settings::default()),
        }
    }

    /// Snapshot of the current settings
    pub fn get(&self) -> Settings {
        self.current.read().expect("settings lock poisoned").clone()
    }

    /// Replace the settings, persisting atomically before publishing.
    ///
    /// If the disk write fails the in-memory settings are left unchanged.
    pub fn update(&self, settings: Settings) -> Result<()> {
        settings.save(&self.path)?;
        *self.current.write().expect("settings lock poisoned") = settings;
        Ok(())
    }
}
