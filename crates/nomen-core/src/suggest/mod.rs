//! Suggestion recomputation
//!
//! Suggestions are never persisted. On every read they are recomputed from
//! the cached analysis record, the current settings, and the UCS engine,
//! so a settings change is reflected immediately without touching rows.
//!
//! Ranking blends classifier confidence with a filename-derived boost:
//! `s_i = softmax(log(c_i + EPS) + ALPHA * k_i)` where `k_i` is the
//! normalized fuzzy score of the same CatID against the current filename.

use crate::config::Settings;
use crate::filename::{self, NameParts};
use crate::types::{
    AnalysisRecord, SuggestedField, SuggestionSource, SuggestionsResult,
};
use crate::ucs::UcsEngine;

/// Weight of the filename boost against log-confidence
const ALPHA: f64 = 10.0;
/// Floor applied before the log so zero confidences stay finite
const EPS: f64 = 1e-9;
/// Synonyms taken from the winning UCS row for the keyword suggestion
const KEYWORD_COUNT: usize = 10;
/// Budget for the fx-name phrase extracted from a caption
const FX_NAME_MAX_LEN: usize = 25;

fn field(value: String, source: SuggestionSource, confidence: Option<f32>) -> SuggestedField {
    SuggestedField {
        value,
        source,
        confidence,
    }
}

/// Recompute the per-file suggestions.
pub fn recompute(
    current_filename: &str,
    analysis: Option<&AnalysisRecord>,
    settings: &Settings,
    ucs: &UcsEngine,
) -> SuggestionsResult {
    let mut out = SuggestionsResult::default();
    let Some(analysis) = analysis else {
        return out;
    };

    if let Some(caption) = analysis.caption.as_deref() {
        let cleaned = clean_caption(caption);
        if !cleaned.is_empty() {
            out.description = Some(field(cleaned, SuggestionSource::Clapcap, None));
        }
        let fx_name = fx_name_from_caption(caption);
        if !fx_name.is_empty() {
            out.fx_name = Some(field(fx_name, SuggestionSource::Derived, None));
        }
    }

    let Some((top_cat_id, top_score)) = rank_hits(current_filename, analysis, ucs) else {
        return out;
    };
    let Some(info) = ucs.get_catid_info(&top_cat_id) else {
        return out;
    };

    let confidence = Some(top_score as f32);
    out.category = Some(field(info.category.clone(), SuggestionSource::Clap, confidence));
    out.subcategory = Some(field(info.subcategory.clone(), SuggestionSource::Clap, confidence));
    out.cat_id = Some(field(info.cat_id.clone(), SuggestionSource::Clap, confidence));
    out.category_full = Some(field(
        info.category_full.clone(),
        SuggestionSource::Derived,
        confidence,
    ));

    if !info.synonyms.is_empty() {
        let keywords = info
            .synonyms
            .iter()
            .take(KEYWORD_COUNT)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        out.keywords = Some(field(keywords, SuggestionSource::Derived, None));
    }

    let parts = NameParts {
        cat_id: info.cat_id.clone(),
        fx_name: out.fx_name.as_ref().map(|f| f.value.clone()),
        ..NameParts::default()
    };
    out.suggested_filename = Some(field(
        filename::generate(&parts, settings),
        SuggestionSource::Generated,
        None,
    ));

    out
}

/// Blend classifier confidences with the filename boost and pick the top
/// CatID. Returns the winner with its softmax score. CatIDs unknown to the
/// engine are skipped with a warning (stale model vocabulary).
fn rank_hits(
    current_filename: &str,
    analysis: &AnalysisRecord,
    ucs: &UcsEngine,
) -> Option<(String, f64)> {
    if analysis.hits.is_empty() {
        return None;
    }

    let boosts = filename::fuzzy_scores_normalized(current_filename, ucs);

    let logits: Vec<f64> = analysis
        .hits
        .iter()
        .map(|hit| {
            let boost = boosts.get(&hit.cat_id).copied().unwrap_or(0.0) as f64;
            (hit.confidence as f64 + EPS).ln() + ALPHA * boost
        })
        .collect();

    let max_logit = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max_logit).exp()).collect();
    let total: f64 = exps.iter().sum();

    let mut scored: Vec<(usize, f64)> = exps
        .iter()
        .enumerate()
        .map(|(i, e)| (i, e / total))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| analysis.hits[a.0].cat_id.cmp(&analysis.hits[b.0].cat_id))
    });

    for (idx, score) in scored {
        let cat_id = &analysis.hits[idx].cat_id;
        if ucs.get_catid_info(cat_id).is_some() {
            return Some((cat_id.clone(), score));
        }
        log::warn!("Classifier hit {cat_id:?} is not in the loaded taxonomy, skipping");
    }
    None
}

/// Normalize a caption: collapse whitespace, strip a trailing period,
/// capitalize the first letter.
fn clean_caption(caption: &str) -> String {
    let collapsed = caption.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches('.').trim_end();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Extract a short FX-name phrase from a caption: leading articles dropped,
/// words accumulated up to the length cap, title-cased.
fn fx_name_from_caption(caption: &str) -> String {
    let words: Vec<&str> = caption
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();

    let mut phrase: Vec<String> = Vec::new();
    let mut len = 0;
    for (i, word) in words.iter().enumerate() {
        if i == 0 && matches!(word.to_lowercase().as_str(), "a" | "an" | "the") {
            continue;
        }
        let extra = word.len() + usize::from(!phrase.is_empty());
        if len + extra > FX_NAME_MAX_LEN {
            break;
        }
        len += extra;
        let mut chars = word.chars();
        let cased = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        phrase.push(cased);
    }
    phrase.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassificationHit;
    use crate::ucs::test_fixtures::engine;

    fn analysis(hits: &[(&str, f32)], caption: Option<&str>) -> AnalysisRecord {
        AnalysisRecord {
            file_hash: "h".into(),
            hits: hits
                .iter()
                .map(|(cat_id, confidence)| ClassificationHit {
                    cat_id: cat_id.to_string(),
                    confidence: *confidence,
                })
                .collect(),
            caption: caption.map(str::to_string),
            model_version: "clap-v2".into(),
            analyzed_at: 0,
        }
    }

    fn settings() -> Settings {
        Settings {
            creator_id: "JD".into(),
            source_id: "NOM".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_no_analysis_no_suggestions() {
        let ucs = engine();
        let result = recompute("x.wav", None, &settings(), &ucs);
        assert_eq!(result, SuggestionsResult::default());
    }

    #[test]
    fn test_top_hit_wins_without_filename_boost() {
        let ucs = engine();
        let analysis = analysis(&[("DOORWood", 0.9), ("DOORMetl", 0.1)], None);
        let result = recompute("untitled.wav", Some(&analysis), &settings(), &ucs);

        assert_eq!(result.cat_id.as_ref().unwrap().value, "DOORWood");
        assert_eq!(result.category.as_ref().unwrap().value, "DOORS");
        assert_eq!(result.subcategory.as_ref().unwrap().value, "WOOD");
        assert_eq!(result.category_full.as_ref().unwrap().value, "DOORS-WOOD");
        let confidence = result.cat_id.as_ref().unwrap().confidence.unwrap();
        assert!(confidence > 0.8);
    }

    #[test]
    fn test_filename_boost_flips_ranking() {
        let ucs = engine();
        // The classifier slightly prefers metal, but the filename clearly
        // says creak; the boost must win.
        let analysis = analysis(&[("DOORMetl", 0.5), ("DOORCreak", 0.4)], None);
        let result = recompute("old_door_creak.wav", Some(&analysis), &settings(), &ucs);
        assert_eq!(result.cat_id.as_ref().unwrap().value, "DOORCreak");
    }

    #[test]
    fn test_unknown_catid_skipped() {
        let ucs = engine();
        let analysis = analysis(&[("NOTINUCS", 0.99), ("WATRFlow", 0.3)], None);
        let result = recompute("x.wav", Some(&analysis), &settings(), &ucs);
        assert_eq!(result.cat_id.as_ref().unwrap().value, "WATRFlow");
    }

    #[test]
    fn test_keywords_from_synonyms() {
        let ucs = engine();
        let analysis = analysis(&[("WATRFlow", 0.9)], None);
        let result = recompute("x.wav", Some(&analysis), &settings(), &ucs);
        assert_eq!(result.keywords.as_ref().unwrap().value, "stream, river, flow");
        assert_eq!(result.keywords.as_ref().unwrap().source, SuggestionSource::Derived);
    }

    #[test]
    fn test_suggested_filename_uses_settings() {
        let ucs = engine();
        let analysis = analysis(
            &[("DOORWood", 0.9)],
            Some("a heavy wooden door slams shut."),
        );
        let result = recompute("x.wav", Some(&analysis), &settings(), &ucs);

        let name = &result.suggested_filename.as_ref().unwrap().value;
        assert!(name.starts_with("DOORWood_"));
        assert!(name.ends_with("_JD_NOM.wav"));
        assert_eq!(
            result.suggested_filename.as_ref().unwrap().source,
            SuggestionSource::Generated
        );
    }

    #[test]
    fn test_caption_cleaning() {
        assert_eq!(
            clean_caption("  a heavy   wooden door slams. "),
            "A heavy wooden door slams"
        );
        assert_eq!(clean_caption(""), "");
    }

    #[test]
    fn test_fx_name_heuristic() {
        assert_eq!(
            fx_name_from_caption("a heavy wooden door slams shut"),
            "Heavy Wooden Door Slams"
        );
        assert_eq!(fx_name_from_caption("the rain"), "Rain");
        assert_eq!(fx_name_from_caption(""), "");
    }

    #[test]
    fn test_description_and_fx_from_caption() {
        let ucs = engine();
        let analysis = analysis(&[("DOORWood", 0.9)], Some("a heavy wooden door slams."));
        let result = recompute("x.wav", Some(&analysis), &settings(), &ucs);

        assert_eq!(
            result.description.as_ref().unwrap().value,
            "A heavy wooden door slams"
        );
        assert_eq!(result.description.as_ref().unwrap().source, SuggestionSource::Clapcap);
        assert_eq!(result.fx_name.as_ref().unwrap().value, "Heavy Wooden Door Slams");
    }
}
