//! UCS taxonomy engine
//!
//! Loads the Universal Category System workbook once at startup and answers
//! lookups from three in-memory tables: CatID → row, category → ordered
//! subcategory rows, and a synonym index inverted from the workbook rows
//! plus a small curated extras map.
//!
//! Loading failure is fatal for the whole core; lookups never fail, they
//! return not-found signals.

mod workbook;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;

use thiserror::Error;

pub use workbook::WorkbookRow;

/// Taxonomy load errors (fatal at startup)
#[derive(Error, Debug)]
pub enum UcsError {
    #[error("failed to read taxonomy workbook: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse taxonomy workbook: {0}")]
    Csv(#[from] csv::Error),

    #[error("taxonomy workbook has no recognizable header row")]
    MissingHeader,

    #[error("taxonomy workbook contains no subcategory rows")]
    Empty,
}

/// Full record for one CatID
#[derive(Debug, Clone, PartialEq)]
pub struct CatIdInfo {
    pub cat_id: String,
    pub category: String,
    pub subcategory: String,
    pub cat_short: String,
    pub category_full: String,
    pub explanation: String,
    pub synonyms: Vec<String>,
}

/// Curated synonym extras on top of the workbook's own synonym columns.
///
/// Terms common in library filenames that the sheet does not carry. Each
/// entry is only indexed when its CatID exists in the loaded workbook, so
/// the list is safe against trimmed or older taxonomy exports. Workbook
/// synonyms are indexed first; extras only ever add CatIDs on top.
const EXTRA_SYNONYMS: &[(&str, &[&str])] = &[
    ("timber", &["DOORWood"]),
    ("lumber", &["DOORWood"]),
    ("handgun", &["GUNPist"]),
    ("sidearm", &["GUNPist"]),
    ("brook", &["WATRFlow"]),
    ("creek", &["WATRFlow"]),
    ("automobile", &["VEHCar"]),
    ("downpour", &["RAINHvy"]),
    ("drizzle", &["RAINLght"]),
    ("footstep", &["FEETHmn"]),
];

/// In-memory UCS taxonomy
pub struct UcsEngine {
    by_catid: HashMap<String, CatIdInfo>,
    /// Categories in workbook insertion order
    categories: Vec<String>,
    /// category → CatIDs in workbook insertion order
    subcategories: HashMap<String, Vec<String>>,
    /// lowercased term → CatIDs; BTreeMap so prefix queries are range scans
    synonyms: BTreeMap<String, BTreeSet<String>>,
    /// category → category-level explanation (secondary sheet)
    category_explanations: HashMap<String, String>,
}

impl UcsEngine {
    /// Load the taxonomy from the primary sheet CSV, plus an optional
    /// secondary sheet of category-level explanations.
    pub fn load(primary: &Path, explanations: Option<&Path>) -> Result<Self, UcsError> {
        let primary_file = File::open(primary)?;
        let explanations_file = match explanations {
            Some(path) => Some(File::open(path)?),
            None => None,
        };
        let engine = Self::from_readers(primary_file, explanations_file)?;
        log::info!(
            "Loaded UCS taxonomy from {:?}: {} categories, {} subcategories",
            primary,
            engine.categories.len(),
            engine.by_catid.len()
        );
        Ok(engine)
    }

    /// Build the engine from in-memory readers (used by tests)
    pub fn from_readers<R: std::io::Read>(
        primary: R,
        explanations: Option<R>,
    ) -> Result<Self, UcsError> {
        let rows = workbook::parse_primary(primary)?;

        let mut by_catid = HashMap::new();
        let mut categories = Vec::new();
        let mut subcategories: HashMap<String, Vec<String>> = HashMap::new();
        let mut synonyms: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for row in rows {
            if !categories.contains(&row.category) {
                categories.push(row.category.clone());
            }
            subcategories
                .entry(row.category.clone())
                .or_default()
                .push(row.cat_id.clone());

            for synonym in &row.synonyms {
                synonyms
                    .entry(synonym.to_lowercase())
                    .or_default()
                    .insert(row.cat_id.clone());
            }
            // The subcategory name itself is a useful fuzzy term
            synonyms
                .entry(row.subcategory.to_lowercase())
                .or_default()
                .insert(row.cat_id.clone());

            by_catid.insert(
                row.cat_id.clone(),
                CatIdInfo {
                    cat_id: row.cat_id,
                    category: row.category,
                    subcategory: row.subcategory,
                    cat_short: row.cat_short,
                    category_full: row.category_full,
                    explanation: row.explanation,
                    synonyms: row.synonyms,
                },
            );
        }

        // Curated extras go in after the workbook terms and only for CatIDs
        // the workbook actually defines.
        for (term, cat_ids) in EXTRA_SYNONYMS {
            for cat_id in *cat_ids {
                if by_catid.contains_key(*cat_id) {
                    synonyms
                        .entry((*term).to_string())
                        .or_default()
                        .insert((*cat_id).to_string());
                }
            }
        }

        let category_explanations = match explanations {
            Some(reader) => workbook::parse_category_explanations(reader)?
                .into_iter()
                .collect(),
            None => HashMap::new(),
        };

        Ok(Self {
            by_catid,
            categories,
            subcategories,
            synonyms,
            category_explanations,
        })
    }

    /// Categories in workbook order
    pub fn list_categories(&self) -> &[String] {
        &self.categories
    }

    /// Ordered subcategory records under a category; empty for unknown names
    pub fn list_subcategories(&self, category: &str) -> Vec<&CatIdInfo> {
        self.subcategories
            .get(category)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.by_catid.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a (category, subcategory) pair to its CatID
    pub fn lookup_catid(&self, category: &str, subcategory: &str) -> Option<&str> {
        self.subcategories.get(category).and_then(|ids| {
            ids.iter()
                .filter_map(|id| self.by_catid.get(id))
                .find(|info| info.subcategory == subcategory)
                .map(|info| info.cat_id.as_str())
        })
    }

    /// Full record for a CatID
    pub fn get_catid_info(&self, cat_id: &str) -> Option<&CatIdInfo> {
        self.by_catid.get(cat_id)
    }

    /// Category-level explanation from the secondary sheet
    pub fn category_explanation(&self, category: &str) -> Option<&str> {
        self.category_explanations.get(category).map(String::as_str)
    }

    /// CatIDs whose synonym terms match a token.
    ///
    /// Prefix-aware: a token matches a synonym when it equals the synonym,
    /// or the synonym starts with the token and the token is at least 4
    /// characters long.
    pub fn synonym_hits(&self, token: &str) -> BTreeSet<&str> {
        let token = token.to_lowercase();
        let mut hits = BTreeSet::new();
        if token.is_empty() {
            return hits;
        }

        if token.len() >= 4 {
            for (term, cat_ids) in self.synonyms.range(token.clone()..) {
                if !term.starts_with(&token) {
                    break;
                }
                hits.extend(cat_ids.iter().map(String::as_str));
            }
        } else if let Some(cat_ids) = self.synonyms.get(&token) {
            hits.extend(cat_ids.iter().map(String::as_str));
        }
        hits
    }

    /// Number of subcategory rows loaded
    pub fn len(&self) -> usize {
        self.by_catid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_catid.is_empty()
    }
}
