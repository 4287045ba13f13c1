//! UCS filename codec
//!
//! A UCS-compliant stem has the layout
//! `CatID[-UserCategory]_[VendorCategory-]FXName_CreatorID_SourceID[_UserData]`
//! with `_` separating blocks and `-` reserved for the CatID/FXName
//! extensions. Filenames that don't conform are matched fuzzily against
//! the taxonomy's synonym index instead.

use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::config::Settings;
use crate::ucs::UcsEngine;

/// Characters never allowed in generated filenames (FAT/NTFS superset)
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Conservative stem length cap, leaving headroom under OS path limits
const MAX_STEM_LEN: usize = 120;

/// Default number of fuzzy candidates returned
pub const DEFAULT_FUZZY_LIMIT: usize = 8;

/// A successfully parsed UCS filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub cat_id: String,
    pub user_category: Option<String>,
    pub vendor_category: Option<String>,
    pub fx_name: String,
    pub creator_id: Option<String>,
    pub source_id: Option<String>,
    pub user_data: Option<String>,
}

/// One fuzzy-match candidate
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyHit {
    pub cat_id: String,
    pub score: f32,
}

/// Outcome of parsing a filename
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ParsedName),
    /// The stem does not conform; best-effort candidates instead
    Fuzzy(Vec<FuzzyHit>),
}

/// Inputs for filename generation
#[derive(Debug, Clone, Default)]
pub struct NameParts {
    pub cat_id: String,
    pub user_category: Option<String>,
    pub fx_name: Option<String>,
    pub creator_id: Option<String>,
    pub source_id: Option<String>,
}

fn strip_wav_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("wav") => stem,
        _ => filename,
    }
}

/// Parse a filename against the taxonomy
pub fn parse(filename: &str, ucs: &UcsEngine) -> ParseOutcome {
    let stem = strip_wav_extension(filename);
    let blocks: Vec<&str> = stem.split('_').collect();
    if blocks.len() < 3 {
        return ParseOutcome::Fuzzy(fuzzy(filename, ucs, DEFAULT_FUZZY_LIMIT));
    }

    // First block: CatID with an optional -UserCategory suffix
    let (cat_candidate, user_category) = match blocks[0].split_once('-') {
        Some((head, rest)) if !rest.is_empty() => (head, Some(rest.to_string())),
        _ => (blocks[0], None),
    };

    if ucs.get_catid_info(cat_candidate).is_none() {
        return ParseOutcome::Fuzzy(fuzzy(filename, ucs, DEFAULT_FUZZY_LIMIT));
    }

    let (vendor_category, fx_name) = split_vendor_prefix(blocks[1]);
    let creator_id = blocks.get(2).map(|s| s.to_string());
    let source_id = blocks.get(3).map(|s| s.to_string());
    // Anything past SourceID collapses into UserData
    let user_data = if blocks.len() > 4 {
        Some(blocks[4..].join("_"))
    } else {
        None
    };

    ParseOutcome::Parsed(ParsedName {
        cat_id: cat_candidate.to_string(),
        user_category,
        vendor_category,
        fx_name: fx_name.to_string(),
        creator_id,
        source_id,
        user_data,
    })
}

/// Split an optional `VendorCategory-` prefix off an FXName block.
///
/// The vendor prefix convention is a short all-caps alphanumeric run, which
/// keeps hyphenated FX names ("Slam-Dunk") intact.
fn split_vendor_prefix(block: &str) -> (Option<String>, &str) {
    if let Some((head, rest)) = block.split_once('-') {
        let looks_like_vendor = !head.is_empty()
            && head.len() <= 16
            && head
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if looks_like_vendor && !rest.is_empty() {
            return (Some(head.to_string()), rest);
        }
    }
    (None, block)
}

/// Tokenize a stem for fuzzy matching: split on `_ - space` and camelCase
/// boundaries, lowercase, dedup, drop tokens shorter than 3 characters.
fn tokenize(stem: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for part in stem.split(['_', '-', ' ', '.']) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in part.chars() {
            if !c.is_alphanumeric() {
                push_token(&mut tokens, &mut current);
                prev_lower = false;
                continue;
            }
            if c.is_uppercase() && prev_lower {
                push_token(&mut tokens, &mut current);
            }
            prev_lower = c.is_lowercase();
            current.extend(c.to_lowercase());
        }
        push_token(&mut tokens, &mut current);
    }
    tokens
}

fn push_token(tokens: &mut BTreeSet<String>, current: &mut String) {
    if current.len() >= 3 {
        tokens.insert(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Fuzzy-match a filename to CatIDs via the synonym index.
///
/// Score = count of distinct tokens that hit a CatID, plus one bonus per
/// token that prefix-matches its category name. Ties break by
/// lexicographic CatID.
pub fn fuzzy(filename: &str, ucs: &UcsEngine, limit: usize) -> Vec<FuzzyHit> {
    let stem = strip_wav_extension(filename);
    let tokens = tokenize(stem);

    // cat_id → (distinct token hits, category-name prefix bonus)
    let mut scores: HashMap<String, (u32, u32)> = HashMap::new();

    for token in &tokens {
        let mut hit: BTreeSet<String> = ucs
            .synonym_hits(token)
            .into_iter()
            .map(str::to_string)
            .collect();

        for category in ucs.list_categories() {
            if category.to_lowercase().starts_with(token.as_str()) {
                for info in ucs.list_subcategories(category) {
                    hit.insert(info.cat_id.clone());
                    scores.entry(info.cat_id.clone()).or_default().1 += 1;
                }
            }
        }

        for cat_id in hit {
            scores.entry(cat_id).or_default().0 += 1;
        }
    }

    let mut hits: Vec<FuzzyHit> = scores
        .into_iter()
        .map(|(cat_id, (token_hits, bonus))| FuzzyHit {
            cat_id,
            score: (token_hits + bonus) as f32,
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cat_id.cmp(&b.cat_id))
    });
    hits.truncate(limit);
    hits
}

/// Normalized fuzzy scores (max → 1.0) keyed by CatID, for blending with
/// classifier confidences.
pub fn fuzzy_scores_normalized(filename: &str, ucs: &UcsEngine) -> HashMap<String, f32> {
    let hits = fuzzy(filename, ucs, DEFAULT_FUZZY_LIMIT);
    let max = hits.first().map(|h| h.score).unwrap_or(0.0);
    if max <= 0.0 {
        return HashMap::new();
    }
    hits.into_iter()
        .map(|h| (h.cat_id, h.score / max))
        .collect()
}

/// Strip filesystem-illegal characters and layout separators from a block
fn sanitize_block(block: &str) -> String {
    block
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_CHARS.contains(c))
        .map(|c| if c == '_' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Generate a UCS filename from parts, falling back to settings defaults
/// for missing CreatorID/SourceID and "Untitled" for a missing FXName.
pub fn generate(parts: &NameParts, settings: &Settings) -> String {
    let mut catid_block = sanitize_block(&parts.cat_id).replace(' ', "");
    if let Some(user_category) = parts
        .user_category
        .as_deref()
        .map(sanitize_block)
        .filter(|s| !s.is_empty())
    {
        catid_block.push('-');
        catid_block.push_str(&user_category);
    }

    let fx_name = parts
        .fx_name
        .as_deref()
        .map(sanitize_block)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let creator = parts
        .creator_id
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| settings.creator_id.clone());
    let source = parts
        .source_id
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| settings.source_id.clone());

    let mut stem = format!(
        "{}_{}_{}_{}",
        catid_block,
        fx_name,
        sanitize_block(&creator),
        sanitize_block(&source)
    );

    if stem.len() > MAX_STEM_LEN {
        // Never cut inside the CatID block
        let mut cut = MAX_STEM_LEN.max(catid_block.len());
        while cut < stem.len() && !stem.is_char_boundary(cut) {
            cut += 1;
        }
        stem.truncate(cut.min(stem.len()));
    }

    format!("{stem}.wav")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucs::test_fixtures::engine;

    fn settings() -> Settings {
        Settings {
            creator_id: "JD".into(),
            source_id: "NOM".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_parse_well_formed() {
        let ucs = engine();
        let outcome = parse("DOORWood_Door Slam_JD_NOM.wav", &ucs);
        let ParseOutcome::Parsed(name) = outcome else {
            panic!("expected parsed name");
        };
        assert_eq!(name.cat_id, "DOORWood");
        assert_eq!(name.fx_name, "Door Slam");
        assert_eq!(name.creator_id.as_deref(), Some("JD"));
        assert_eq!(name.source_id.as_deref(), Some("NOM"));
        assert_eq!(name.user_data, None);
    }

    #[test]
    fn test_parse_user_category_and_user_data() {
        let ucs = engine();
        let outcome = parse("DOORWood-Heavy_Slam_JD_NOM_take2_alt.wav", &ucs);
        let ParseOutcome::Parsed(name) = outcome else {
            panic!("expected parsed name");
        };
        assert_eq!(name.user_category.as_deref(), Some("Heavy"));
        assert_eq!(name.user_data.as_deref(), Some("take2_alt"));
    }

    #[test]
    fn test_parse_vendor_prefix() {
        let ucs = engine();
        let outcome = parse("DOORWood_BOOM-Slam_JD_NOM.wav", &ucs);
        let ParseOutcome::Parsed(name) = outcome else {
            panic!("expected parsed name");
        };
        assert_eq!(name.vendor_category.as_deref(), Some("BOOM"));
        assert_eq!(name.fx_name, "Slam");

        // Hyphenated FX names are not vendor prefixes
        let outcome = parse("DOORWood_Slam-Dunk_JD_NOM.wav", &ucs);
        let ParseOutcome::Parsed(name) = outcome else {
            panic!("expected parsed name");
        };
        assert_eq!(name.vendor_category, None);
        assert_eq!(name.fx_name, "Slam-Dunk");
    }

    #[test]
    fn test_parse_short_stem_goes_fuzzy() {
        let ucs = engine();
        assert!(matches!(
            parse("door_slam.wav", &ucs),
            ParseOutcome::Fuzzy(_)
        ));
    }

    #[test]
    fn test_parse_unknown_catid_goes_fuzzy() {
        let ucs = engine();
        assert!(matches!(
            parse("XYZZY_Slam_JD_NOM.wav", &ucs),
            ParseOutcome::Fuzzy(_)
        ));
    }

    #[test]
    fn test_tokenize_camel_case() {
        let tokens = tokenize("timberDoorCreak_mono 96k");
        assert!(tokens.contains("timber"));
        assert!(tokens.contains("door"));
        assert!(tokens.contains("creak"));
        assert!(tokens.contains("mono"));
        // "96k" is shorter than 3 characters
        assert!(!tokens.contains("96k"));
    }

    #[test]
    fn test_fuzzy_scenario_two_token_match() {
        let ucs = engine();
        let hits = fuzzy("timber_door_creak_mono.wav", &ucs, 8);
        let cat_ids: Vec<&str> = hits.iter().map(|h| h.cat_id.as_str()).collect();
        assert!(cat_ids.contains(&"DOORWood"));
        assert!(cat_ids.contains(&"DOORCreak"));
        // Both match two tokens plus the category-prefix bonus from "door";
        // the tie breaks lexicographically.
        assert_eq!(hits[0].cat_id, "DOORCreak");
        assert_eq!(hits[0].score, hits[1].score);
    }

    #[test]
    fn test_fuzzy_scores_normalized() {
        let ucs = engine();
        let scores = fuzzy_scores_normalized("timber_slam.wav", &ucs);
        assert_eq!(scores.get("DOORWood"), Some(&1.0));
    }

    #[test]
    fn test_generate_defaults() {
        let ucs = engine();
        let parts = NameParts {
            cat_id: "DOORWood".into(),
            ..NameParts::default()
        };
        let name = generate(&parts, &settings());
        assert_eq!(name, "DOORWood_Untitled_JD_NOM.wav");

        let ParseOutcome::Parsed(parsed) = parse(&name, &ucs) else {
            panic!("generated name must parse");
        };
        assert_eq!(parsed.cat_id, "DOORWood");
        assert_eq!(parsed.fx_name, "Untitled");
    }

    #[test]
    fn test_generate_parse_roundtrip() {
        let ucs = engine();
        let parts = NameParts {
            cat_id: "WATRFlow".into(),
            fx_name: Some("River Close".into()),
            creator_id: Some("AB".into()),
            source_id: Some("LIB".into()),
            ..NameParts::default()
        };
        let name = generate(&parts, &settings());
        let ParseOutcome::Parsed(parsed) = parse(&name, &ucs) else {
            panic!("generated name must parse");
        };
        assert_eq!(parsed.cat_id, "WATRFlow");
        assert_eq!(parsed.fx_name, "River Close");
        assert_eq!(parsed.creator_id.as_deref(), Some("AB"));
        assert_eq!(parsed.source_id.as_deref(), Some("LIB"));
    }

    #[test]
    fn test_generate_sanitizes_and_truncates() {
        let parts = NameParts {
            cat_id: "DOORWood".into(),
            fx_name: Some(format!("Sl/am:{}", "x".repeat(300))),
            ..NameParts::default()
        };
        let name = generate(&parts, &settings());
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert!(name.len() <= MAX_STEM_LEN + 4);
        assert!(name.starts_with("DOORWood_"));
    }

    #[test]
    fn test_generate_strips_underscores_in_fx() {
        let parts = NameParts {
            cat_id: "DOORWood".into(),
            fx_name: Some("Door_Slam".into()),
            ..NameParts::default()
        };
        let name = generate(&parts, &settings());
        assert_eq!(name, "DOORWood_Door Slam_JD_NOM.wav");
    }
}
