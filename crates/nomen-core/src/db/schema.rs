//! CozoDB schema for the file repository
//!
//! Two relations:
//! - `files`: one row per imported WAV, keyed by record id with a
//!   secondary path lookup enforced at the repository layer. Structured
//!   sub-objects (metadata working set, custom fields, chunk snapshots,
//!   changed-field tracking) are stored as JSON text columns.
//! - `analysis_cache`: classifier output keyed by content hash; survives
//!   renames of the backing file and outlives the file rows.

use cozo::DbInstance;

use super::DbError;

/// Get the set of existing relation names in the database
fn get_existing_relations(
    db: &DbInstance,
) -> Result<std::collections::HashSet<String>, DbError> {
    let result = db
        .run_script(
            "::relations",
            Default::default(),
            cozo::ScriptMutability::Immutable,
        )
        .map_err(|e| DbError::Schema(e.to_string()))?;

    let mut relations = std::collections::HashSet::new();
    for row in result.rows {
        if let Some(name) = row.first().and_then(|v| v.get_str()) {
            relations.insert(name.to_string());
        }
    }
    Ok(relations)
}

/// Create all required relations (idempotent)
pub fn create_all_relations(db: &DbInstance) -> Result<(), DbError> {
    let existing = get_existing_relations(db)?;
    log::debug!("Existing relations: {:?}", existing);

    if !existing.contains("files") {
        log::debug!("Creating 'files' relation");
        create_files_relation(db)?;
    }
    if !existing.contains("analysis_cache") {
        log::debug!("Creating 'analysis_cache' relation");
        create_analysis_cache_relation(db)?;
    }
    Ok(())
}

fn run_schema(db: &DbInstance, script: &str) -> Result<(), DbError> {
    db.run_script(script, Default::default(), cozo::ScriptMutability::Mutable)
        .map_err(|e| DbError::Schema(e.to_string()))?;
    Ok(())
}

fn create_files_relation(db: &DbInstance) -> Result<(), DbError> {
    run_schema(
        db,
        r#"
        {:create files {
            id: Int =>
            path: String,
            directory: String,
            filename: String,
            status: String,
            flagged: Bool,
            file_hash: String,
            sample_rate: Int,
            bit_depth: Int,
            channels: Int,
            frame_count: Int,
            duration_seconds: Float,
            format_tag: Int,
            byte_size: Int,
            metadata: String,
            custom_fields: String,
            bext: String?,
            info: String,
            changed_fields: String,
            rename_on_save: Bool,
            analysis_hash: String?
        }}
    "#,
    )
}

fn create_analysis_cache_relation(db: &DbInstance) -> Result<(), DbError> {
    run_schema(
        db,
        r#"
        {:create analysis_cache {
            file_hash: String =>
            hits: String,
            caption: String?,
            model_version: String,
            analyzed_at: Int
        }}
    "#,
    )
}
