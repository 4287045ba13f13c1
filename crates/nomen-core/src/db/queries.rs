//! Typed query wrappers for the repository relations

use std::collections::BTreeMap;
use std::path::PathBuf;

use cozo::{DataValue, NamedRows};

use super::{DbError, NomenDb};
use crate::types::{AnalysisRecord, ClassificationHit, FileRecord, FileStatus, TechnicalInfo};

/// Column list for file queries; must match the schema and decode order
const FILE_COLUMNS: &str = "id, path, directory, filename, status, flagged, file_hash, \
     sample_rate, bit_depth, channels, frame_count, duration_seconds, format_tag, byte_size, \
     metadata, custom_fields, bext, info, changed_fields, rename_on_save, analysis_hash";

fn str_at(row: &[DataValue], idx: usize, col: &str) -> Result<String, DbError> {
    row.get(idx)
        .and_then(|v| v.get_str())
        .map(str::to_string)
        .ok_or_else(|| DbError::Decode(format!("column {col} is not a string")))
}

fn opt_str_at(row: &[DataValue], idx: usize) -> Option<String> {
    row.get(idx).and_then(|v| v.get_str()).map(str::to_string)
}

fn int_at(row: &[DataValue], idx: usize, col: &str) -> Result<i64, DbError> {
    row.get(idx)
        .and_then(|v| v.get_int())
        .ok_or_else(|| DbError::Decode(format!("column {col} is not an integer")))
}

fn float_at(row: &[DataValue], idx: usize, col: &str) -> Result<f64, DbError> {
    row.get(idx)
        .and_then(|v| v.get_float())
        .ok_or_else(|| DbError::Decode(format!("column {col} is not a float")))
}

fn bool_at(row: &[DataValue], idx: usize, col: &str) -> Result<bool, DbError> {
    row.get(idx)
        .and_then(|v| v.get_bool())
        .ok_or_else(|| DbError::Decode(format!("column {col} is not a bool")))
}

fn json_at<T: serde::de::DeserializeOwned>(
    row: &[DataValue],
    idx: usize,
    col: &str,
) -> Result<T, DbError> {
    let text = str_at(row, idx, col)?;
    serde_json::from_str(&text)
        .map_err(|e| DbError::Decode(format!("column {col} holds bad JSON: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|e| DbError::Decode(e.to_string()))
}

fn row_to_record(row: &[DataValue]) -> Result<FileRecord, DbError> {
    let status_text = str_at(row, 4, "status")?;
    let status = FileStatus::parse(&status_text)
        .ok_or_else(|| DbError::Decode(format!("unknown status {status_text:?}")))?;

    Ok(FileRecord {
        id: int_at(row, 0, "id")?,
        path: PathBuf::from(str_at(row, 1, "path")?),
        directory: PathBuf::from(str_at(row, 2, "directory")?),
        filename: str_at(row, 3, "filename")?,
        status,
        flagged: bool_at(row, 5, "flagged")?,
        file_hash: str_at(row, 6, "file_hash")?,
        technical: TechnicalInfo {
            sample_rate: int_at(row, 7, "sample_rate")? as u32,
            bit_depth: int_at(row, 8, "bit_depth")? as u16,
            channels: int_at(row, 9, "channels")? as u16,
            frame_count: int_at(row, 10, "frame_count")? as u64,
            duration_seconds: float_at(row, 11, "duration_seconds")?,
            format_tag: int_at(row, 12, "format_tag")? as u16,
            byte_size: int_at(row, 13, "byte_size")? as u64,
        },
        fields: json_at(row, 14, "metadata")?,
        custom_fields: json_at(row, 15, "custom_fields")?,
        bext: match opt_str_at(row, 16) {
            Some(text) => Some(
                serde_json::from_str(&text)
                    .map_err(|e| DbError::Decode(format!("column bext holds bad JSON: {e}")))?,
            ),
            None => None,
        },
        info: json_at(row, 17, "info")?,
        changed_fields: json_at(row, 18, "changed_fields")?,
        // Recomputed on read, never stored
        suggested_filename: None,
        rename_on_save: bool_at(row, 19, "rename_on_save")?,
        analysis_hash: opt_str_at(row, 20),
    })
}

fn rows_to_records(result: &NamedRows) -> Result<Vec<FileRecord>, DbError> {
    result.rows.iter().map(|row| row_to_record(row)).collect()
}

fn record_params(record: &FileRecord) -> Result<BTreeMap<String, DataValue>, DbError> {
    let mut params = BTreeMap::new();
    params.insert("id".to_string(), DataValue::from(record.id));
    params.insert(
        "path".to_string(),
        DataValue::from(record.path.to_string_lossy().to_string()),
    );
    params.insert(
        "directory".to_string(),
        DataValue::from(record.directory.to_string_lossy().to_string()),
    );
    params.insert("filename".to_string(), DataValue::from(record.filename.clone()));
    params.insert("status".to_string(), DataValue::from(record.status.as_str()));
    params.insert("flagged".to_string(), DataValue::from(record.flagged));
    params.insert("file_hash".to_string(), DataValue::from(record.file_hash.clone()));
    params.insert(
        "sample_rate".to_string(),
        DataValue::from(record.technical.sample_rate as i64),
    );
    params.insert(
        "bit_depth".to_string(),
        DataValue::from(record.technical.bit_depth as i64),
    );
    params.insert(
        "channels".to_string(),
        DataValue::from(record.technical.channels as i64),
    );
    params.insert(
        "frame_count".to_string(),
        DataValue::from(record.technical.frame_count as i64),
    );
    params.insert(
        "duration_seconds".to_string(),
        DataValue::from(record.technical.duration_seconds),
    );
    params.insert(
        "format_tag".to_string(),
        DataValue::from(record.technical.format_tag as i64),
    );
    params.insert(
        "byte_size".to_string(),
        DataValue::from(record.technical.byte_size as i64),
    );
    params.insert("metadata".to_string(), DataValue::from(to_json(&record.fields)?));
    params.insert(
        "custom_fields".to_string(),
        DataValue::from(to_json(&record.custom_fields)?),
    );
    params.insert(
        "bext".to_string(),
        match &record.bext {
            Some(snapshot) => DataValue::from(to_json(snapshot)?),
            None => DataValue::Null,
        },
    );
    params.insert("info".to_string(), DataValue::from(to_json(&record.info)?));
    params.insert(
        "changed_fields".to_string(),
        DataValue::from(to_json(&record.changed_fields)?),
    );
    params.insert(
        "rename_on_save".to_string(),
        DataValue::from(record.rename_on_save),
    );
    params.insert(
        "analysis_hash".to_string(),
        match &record.analysis_hash {
            Some(hash) => DataValue::from(hash.clone()),
            None => DataValue::Null,
        },
    );
    Ok(params)
}

// ============================================================================
// File queries
// ============================================================================

/// Query builder for file records
pub struct FileQuery;

impl FileQuery {
    /// Insert or replace a record
    pub fn upsert(db: &NomenDb, record: &FileRecord) -> Result<(), DbError> {
        let params = record_params(record)?;
        db.run_script(
            &format!(
                r#"
                ?[{FILE_COLUMNS}] <- [[
                    $id, $path, $directory, $filename, $status, $flagged, $file_hash,
                    $sample_rate, $bit_depth, $channels, $frame_count, $duration_seconds, $format_tag, $byte_size,
                    $metadata, $custom_fields, $bext, $info, $changed_fields, $rename_on_save, $analysis_hash
                ]]
                :put files {{id => path, directory, filename, status, flagged, file_hash,
                    sample_rate, bit_depth, channels, frame_count, duration_seconds, format_tag, byte_size,
                    metadata, custom_fields, bext, info, changed_fields, rename_on_save, analysis_hash}}
                "#
            ),
            params,
        )?;
        Ok(())
    }

    pub fn get_by_id(db: &NomenDb, id: i64) -> Result<Option<FileRecord>, DbError> {
        let result = db.run_query(
            &format!(
                "?[{FILE_COLUMNS}] := *files{{{FILE_COLUMNS}}}, id = $id"
            ),
            crate::params!("id" => id),
        )?;
        Ok(rows_to_records(&result)?.into_iter().next())
    }

    pub fn get_by_path(db: &NomenDb, path: &str) -> Result<Option<FileRecord>, DbError> {
        let result = db.run_query(
            &format!(
                "?[{FILE_COLUMNS}] := *files{{{FILE_COLUMNS}}}, path = $path"
            ),
            crate::params!("path" => path),
        )?;
        Ok(rows_to_records(&result)?.into_iter().next())
    }

    pub fn get_by_hash(db: &NomenDb, file_hash: &str) -> Result<Option<FileRecord>, DbError> {
        let result = db.run_query(
            &format!(
                "?[{FILE_COLUMNS}] := *files{{{FILE_COLUMNS}}}, file_hash = $hash"
            ),
            crate::params!("hash" => file_hash),
        )?;
        Ok(rows_to_records(&result)?.into_iter().next())
    }

    /// All records ordered by filename
    pub fn get_all(db: &NomenDb) -> Result<Vec<FileRecord>, DbError> {
        let result = db.run_query(
            &format!(
                "?[{FILE_COLUMNS}] := *files{{{FILE_COLUMNS}}}\n:order filename"
            ),
            crate::params!(),
        )?;
        rows_to_records(&result)
    }

    pub fn delete(db: &NomenDb, id: i64) -> Result<(), DbError> {
        db.run_script(
            "?[id] <- [[$id]]\n:rm files {id}",
            crate::params!("id" => id),
        )?;
        Ok(())
    }

    pub fn delete_all(db: &NomenDb) -> Result<(), DbError> {
        db.run_script("?[id] := *files{id}\n:rm files {id}", crate::params!())?;
        Ok(())
    }

    pub fn count(db: &NomenDb) -> Result<usize, DbError> {
        let result = db.run_query("?[count(id)] := *files{id}", crate::params!())?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.get_int())
            .unwrap_or(0) as usize)
    }
}

// ============================================================================
// Analysis cache queries
// ============================================================================

/// Query builder for the analysis cache
pub struct AnalysisQuery;

impl AnalysisQuery {
    pub fn put(db: &NomenDb, record: &AnalysisRecord) -> Result<(), DbError> {
        let hits = to_json(&record.hits)?;
        let mut params = BTreeMap::new();
        params.insert(
            "file_hash".to_string(),
            DataValue::from(record.file_hash.clone()),
        );
        params.insert("hits".to_string(), DataValue::from(hits));
        params.insert(
            "caption".to_string(),
            match &record.caption {
                Some(caption) => DataValue::from(caption.clone()),
                None => DataValue::Null,
            },
        );
        params.insert(
            "model_version".to_string(),
            DataValue::from(record.model_version.clone()),
        );
        params.insert("analyzed_at".to_string(), DataValue::from(record.analyzed_at));

        db.run_script(
            r#"
            ?[file_hash, hits, caption, model_version, analyzed_at] <- [[
                $file_hash, $hits, $caption, $model_version, $analyzed_at
            ]]
            :put analysis_cache {file_hash => hits, caption, model_version, analyzed_at}
            "#,
            params,
        )?;
        Ok(())
    }

    pub fn get(db: &NomenDb, file_hash: &str) -> Result<Option<AnalysisRecord>, DbError> {
        let result = db.run_query(
            r#"
            ?[file_hash, hits, caption, model_version, analyzed_at] :=
                *analysis_cache{file_hash, hits, caption, model_version, analyzed_at},
                file_hash = $hash
            "#,
            crate::params!("hash" => file_hash),
        )?;

        let Some(row) = result.rows.first() else {
            return Ok(None);
        };
        let hits: Vec<ClassificationHit> = json_at(row, 1, "hits")?;
        Ok(Some(AnalysisRecord {
            file_hash: str_at(row, 0, "file_hash")?,
            hits,
            caption: opt_str_at(row, 2),
            model_version: str_at(row, 3, "model_version")?,
            analyzed_at: int_at(row, 4, "analyzed_at")?,
        }))
    }

    pub fn clear(db: &NomenDb) -> Result<(), DbError> {
        db.run_script(
            "?[file_hash] := *analysis_cache{file_hash}\n:rm analysis_cache {file_hash}",
            crate::params!(),
        )?;
        Ok(())
    }

    pub fn count(db: &NomenDb) -> Result<usize, DbError> {
        let result = db.run_query(
            "?[count(file_hash)] := *analysis_cache{file_hash}",
            crate::params!(),
        )?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.get_int())
            .unwrap_or(0) as usize)
    }
}
