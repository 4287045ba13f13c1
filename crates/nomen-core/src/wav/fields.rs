//! Field mapping table
//!
//! The stable contract between record fields and the three metadata
//! chunks: iXML `<USER>` tags (ALL CAPS, authoritative), `<ASWG>` tags
//! (camelCase, secondary), and the bext / LIST-INFO fallbacks.

use std::collections::BTreeSet;

/// Which bext string field a record field falls back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BextField {
    Description,
    Originator,
}

/// One row of the mapping table
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub field: &'static str,
    pub user_tag: Option<&'static str>,
    pub aswg_tag: Option<&'static str>,
    pub bext: Option<BextField>,
    pub info_id: Option<&'static str>,
}

/// USER tag literal stamped by the writer
pub const EMBEDDER_TAG: &str = "EMBEDDER";
pub const EMBEDDER_VALUE: &str = "NomenAudio";

/// ASWG tag literal stamped by the writer
pub const CONTENT_TYPE_TAG: &str = "contentType";
pub const CONTENT_TYPE_VALUE: &str = "sfx";

pub const FIELD_MAPPINGS: &[FieldMapping] = &[
    FieldMapping { field: "category",        user_tag: Some("CATEGORY"),       aswg_tag: Some("category"),     bext: None,                          info_id: Some("IGNR") },
    FieldMapping { field: "subcategory",     user_tag: Some("SUBCATEGORY"),    aswg_tag: Some("subCategory"),  bext: None,                          info_id: None },
    FieldMapping { field: "cat_id",          user_tag: Some("CATID"),          aswg_tag: Some("catId"),        bext: None,                          info_id: None },
    FieldMapping { field: "category_full",   user_tag: Some("CATEGORYFULL"),   aswg_tag: None,                 bext: None,                          info_id: None },
    FieldMapping { field: "fx_name",         user_tag: Some("FXNAME"),         aswg_tag: Some("fxName"),       bext: None,                          info_id: Some("INAM") },
    FieldMapping { field: "description",     user_tag: Some("DESCRIPTION"),    aswg_tag: None,                 bext: Some(BextField::Description),  info_id: None },
    FieldMapping { field: "keywords",        user_tag: Some("KEYWORDS"),       aswg_tag: None,                 bext: None,                          info_id: Some("IKEY") },
    FieldMapping { field: "notes",           user_tag: Some("NOTES"),          aswg_tag: Some("notes"),        bext: None,                          info_id: Some("ICMT") },
    FieldMapping { field: "designer",        user_tag: Some("DESIGNER"),       aswg_tag: Some("originator"),   bext: Some(BextField::Originator),   info_id: Some("IART") },
    FieldMapping { field: "library",         user_tag: Some("LIBRARY"),        aswg_tag: Some("library"),      bext: None,                          info_id: Some("IPRD") },
    FieldMapping { field: "user_category",   user_tag: Some("USERCATEGORY"),   aswg_tag: Some("userCategory"), bext: None,                          info_id: None },
    FieldMapping { field: "microphone",      user_tag: Some("MICROPHONE"),     aswg_tag: Some("micType"),      bext: None,                          info_id: None },
    FieldMapping { field: "mic_perspective", user_tag: Some("MICPERSPECTIVE"), aswg_tag: None,                 bext: None,                          info_id: None },
    FieldMapping { field: "rec_medium",      user_tag: Some("RECMEDIUM"),      aswg_tag: None,                 bext: None,                          info_id: None },
    FieldMapping { field: "release_date",    user_tag: Some("RELEASEDATE"),    aswg_tag: None,                 bext: None,                          info_id: None },
    FieldMapping { field: "rating",          user_tag: Some("RATING"),         aswg_tag: None,                 bext: None,                          info_id: None },
    FieldMapping { field: "manufacturer",    user_tag: Some("MANUFACTURER"),   aswg_tag: Some("manufacturer"), bext: None,                          info_id: None },
    FieldMapping { field: "rec_type",        user_tag: Some("RECTYPE"),        aswg_tag: Some("recType"),      bext: None,                          info_id: None },
    FieldMapping { field: "creator_id",      user_tag: Some("CREATORID"),      aswg_tag: Some("creatorId"),    bext: None,                          info_id: None },
    FieldMapping { field: "source_id",       user_tag: Some("SOURCEID"),       aswg_tag: Some("sourceId"),     bext: None,                          info_id: None },
    FieldMapping { field: "is_designed",     user_tag: None,                   aswg_tag: Some("isDesigned"),   bext: None,                          info_id: None },
    FieldMapping { field: "project",         user_tag: None,                   aswg_tag: Some("project"),      bext: None,                          info_id: None },
];

/// Mapping row for a record field name
pub fn mapping_for(field: &str) -> Option<&'static FieldMapping> {
    FIELD_MAPPINGS.iter().find(|m| m.field == field)
}

/// Record field for a USER tag
pub fn field_for_user_tag(tag: &str) -> Option<&'static str> {
    FIELD_MAPPINGS
        .iter()
        .find(|m| m.user_tag == Some(tag))
        .map(|m| m.field)
}

/// Record field for an ASWG tag
pub fn field_for_aswg_tag(tag: &str) -> Option<&'static str> {
    FIELD_MAPPINGS
        .iter()
        .find(|m| m.aswg_tag == Some(tag))
        .map(|m| m.field)
}

/// The built-in USER tag set; custom field tags must stay disjoint from it
pub fn builtin_user_tags() -> BTreeSet<&'static str> {
    FIELD_MAPPINGS
        .iter()
        .filter_map(|m| m.user_tag)
        .chain(std::iter::once(EMBEDDER_TAG))
        .collect()
}
