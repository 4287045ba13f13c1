//! Common types for the nomen core
//!
//! The central entity is [`FileRecord`], the per-file row held by the
//! repository. Suggestion types live here too because they are part of the
//! read model (recomputed on every read, never persisted).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Built-in metadata field names, in the order of the field mapping table.
///
/// Custom iXML USER tags must stay disjoint from the USER tags these map to.
pub const FIELD_NAMES: &[&str] = &[
    "category",
    "subcategory",
    "cat_id",
    "category_full",
    "user_category",
    "fx_name",
    "description",
    "keywords",
    "notes",
    "designer",
    "library",
    "project",
    "microphone",
    "mic_perspective",
    "rec_medium",
    "release_date",
    "rating",
    "is_designed",
    "manufacturer",
    "rec_type",
    "creator_id",
    "source_id",
];

/// Lifecycle status of a file record
///
/// Driven by edits and saves: any metadata mutation makes a record
/// `Modified`, a successful save makes it `Saved`, revert drops it back to
/// `Unmodified`. User review flagging is a separate bit on the record so a
/// flagged file can also be dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Unmodified,
    Modified,
    Saved,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Unmodified => "unmodified",
            FileStatus::Modified => "modified",
            FileStatus::Saved => "saved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unmodified" => Some(FileStatus::Unmodified),
            "modified" => Some(FileStatus::Modified),
            "saved" => Some(FileStatus::Saved),
            _ => None,
        }
    }
}

/// Immutable technical properties read from the fmt/data chunks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalInfo {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    pub frame_count: u64,
    pub duration_seconds: f64,
    /// Audio format tag from the fmt chunk (1 = PCM, 3 = IEEE float)
    pub format_tag: u16,
    pub byte_size: u64,
}

/// Snapshot of the bext chunk string fields as read from disk
///
/// Used at write time to decide which bext fields are empty and may be
/// gap-filled from the iXML working set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BextSnapshot {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    pub origination_date: String,
    pub origination_time: String,
    pub time_reference: u64,
    pub version: u16,
    pub coding_history: String,
}

/// Snapshot of the LIST-INFO sub-chunks as read from disk (fourcc → value)
pub type InfoSnapshot = BTreeMap<String, String>;

/// The built-in metadata working set of a file record
///
/// All fields optional; `None` means "not present in any source chunk".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFields {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub cat_id: Option<String>,
    pub category_full: Option<String>,
    pub user_category: Option<String>,
    pub fx_name: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub notes: Option<String>,
    pub designer: Option<String>,
    pub library: Option<String>,
    pub project: Option<String>,
    pub microphone: Option<String>,
    pub mic_perspective: Option<String>,
    pub rec_medium: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<String>,
    pub is_designed: Option<String>,
    pub manufacturer: Option<String>,
    pub rec_type: Option<String>,
    pub creator_id: Option<String>,
    pub source_id: Option<String>,
}

impl MetadataFields {
    /// Read a field by its canonical name
    pub fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "category" => &self.category,
            "subcategory" => &self.subcategory,
            "cat_id" => &self.cat_id,
            "category_full" => &self.category_full,
            "user_category" => &self.user_category,
            "fx_name" => &self.fx_name,
            "description" => &self.description,
            "keywords" => &self.keywords,
            "notes" => &self.notes,
            "designer" => &self.designer,
            "library" => &self.library,
            "project" => &self.project,
            "microphone" => &self.microphone,
            "mic_perspective" => &self.mic_perspective,
            "rec_medium" => &self.rec_medium,
            "release_date" => &self.release_date,
            "rating" => &self.rating,
            "is_designed" => &self.is_designed,
            "manufacturer" => &self.manufacturer,
            "rec_type" => &self.rec_type,
            "creator_id" => &self.creator_id,
            "source_id" => &self.source_id,
            _ => return None,
        };
        value.as_deref()
    }

    /// Set a field by its canonical name; returns false for unknown names
    pub fn set(&mut self, field: &str, value: Option<String>) -> bool {
        let slot = match field {
            "category" => &mut self.category,
            "subcategory" => &mut self.subcategory,
            "cat_id" => &mut self.cat_id,
            "category_full" => &mut self.category_full,
            "user_category" => &mut self.user_category,
            "fx_name" => &mut self.fx_name,
            "description" => &mut self.description,
            "keywords" => &mut self.keywords,
            "notes" => &mut self.notes,
            "designer" => &mut self.designer,
            "library" => &mut self.library,
            "project" => &mut self.project,
            "microphone" => &mut self.microphone,
            "mic_perspective" => &mut self.mic_perspective,
            "rec_medium" => &mut self.rec_medium,
            "release_date" => &mut self.release_date,
            "rating" => &mut self.rating,
            "is_designed" => &mut self.is_designed,
            "manufacturer" => &mut self.manufacturer,
            "rec_type" => &mut self.rec_type,
            "creator_id" => &mut self.creator_id,
            "source_id" => &mut self.source_id,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Names of all fields that currently hold a value
    pub fn present_fields(&self) -> Vec<&'static str> {
        FIELD_NAMES
            .iter()
            .copied()
            .filter(|f| self.get(f).is_some())
            .collect()
    }
}

/// The canonical per-file entity held by the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable opaque id, allocated at import and kept across renames
    pub id: i64,
    /// Absolute path of the backing WAV file
    pub path: PathBuf,
    pub directory: PathBuf,
    pub filename: String,

    pub status: FileStatus,
    /// User review marker; composes with the dirty status
    pub flagged: bool,

    /// Cheap stable fingerprint of the backing file (lowercase hex)
    pub file_hash: String,

    pub technical: TechnicalInfo,
    pub fields: MetadataFields,

    /// User-defined iXML USER-block tags (tag → value); tags match
    /// `[A-Z0-9_]{1,32}` and are disjoint from the built-in USER tags.
    pub custom_fields: BTreeMap<String, String>,

    /// Raw chunk snapshots as read (empty-field detection at write time)
    pub bext: Option<BextSnapshot>,
    pub info: InfoSnapshot,

    /// Metadata field names modified since the last save
    pub changed_fields: BTreeSet<String>,

    pub suggested_filename: Option<String>,
    pub rename_on_save: bool,

    /// Content hash key into the analysis cache, when an analysis exists
    pub analysis_hash: Option<String>,
}

impl FileRecord {
    /// Display name: filename without the .wav extension
    pub fn stem(&self) -> &str {
        self.filename
            .strip_suffix(".wav")
            .or_else(|| self.filename.strip_suffix(".WAV"))
            .unwrap_or(&self.filename)
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed_fields.is_empty()
    }
}

/// One classifier hit: a CatID with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationHit {
    pub cat_id: String,
    /// Classifier confidence in [0, 1]
    pub confidence: f32,
}

/// Cached ML output, keyed by file content hash
///
/// Outlives the file records that reference it; a rename of the backing
/// file keeps the same hash and therefore the same cached analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub file_hash: String,
    /// Ordered classifier hits, best first (top 50 retained)
    pub hits: Vec<ClassificationHit>,
    pub caption: Option<String>,
    pub model_version: String,
    /// Unix seconds when the analysis ran
    pub analyzed_at: i64,
}

/// Maximum classifier hits retained per analysis record
pub const ANALYSIS_TOP_K: usize = 50;

/// Where a suggested value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    /// Classifier hit list
    Clap,
    /// Captioner text
    Clapcap,
    /// Derived from a UCS row or the caption
    Derived,
    /// Assembled from settings and other suggestions
    Generated,
}

/// One suggested field value with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedField {
    pub value: String,
    pub source: SuggestionSource,
    /// Confidence in [0, 1]; `None` for values with no meaningful score
    pub confidence: Option<f32>,
}

/// Per-file suggestions, recomputed on every read
///
/// A pure function of the cached analysis, the current settings, and the
/// UCS engine, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionsResult {
    pub category: Option<SuggestedField>,
    pub subcategory: Option<SuggestedField>,
    pub cat_id: Option<SuggestedField>,
    pub category_full: Option<SuggestedField>,
    pub keywords: Option<SuggestedField>,
    pub suggested_filename: Option<SuggestedField>,
    pub description: Option<SuggestedField>,
    pub fx_name: Option<SuggestedField>,
}
