//! File repository
//!
//! Owns the embedded store and is the sole writer to it. All reads attach
//! freshly recomputed suggestions; all mutations of one record are
//! serialized through a per-id lock so concurrent updates interleave at
//! record granularity and never torn within one.

mod import;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::analysis::{run_analysis, AnalyzeOptions, Classifier, ModelGate};
use crate::config::SettingsStore;
use crate::db::{AnalysisQuery, FileQuery, NomenDb};
use crate::error::{CoreError, CoreResult};
use crate::filename::{self, NameParts};
use crate::hash::file_hash;
use crate::suggest;
use crate::types::{FileRecord, FileStatus, SuggestionsResult};
use crate::ucs::UcsEngine;
use crate::wav::{self, WriteRequest};

pub use import::{ImportEvent, ImportOptions, ImportResult, SkippedFile};

/// A record plus its recomputed read model
#[derive(Debug, Clone)]
pub struct FileView {
    pub record: FileRecord,
    pub suggestions: SuggestionsResult,
}

/// A partial metadata update
///
/// `None` values clear a field. Custom-field entries mapped to `None`
/// remove that tag from the record (the tag disappears from the USER block
/// on the next save only if it was added by us; foreign tags survive).
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub fields: BTreeMap<String, Option<String>>,
    pub custom_fields: BTreeMap<String, Option<String>>,
    pub rename_on_save: Option<bool>,
    pub flagged: Option<bool>,
}

/// Options for a single-file save
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Override the record's rename-on-save setting
    pub rename: Option<bool>,
    /// Write the merged file to this path instead of replacing the
    /// original (save-a-copy); the record itself is not rewritten
    pub copy_to: Option<PathBuf>,
}

/// Result of a committed save
#[derive(Debug)]
pub struct SaveResult {
    pub view: FileView,
    /// Content committed but the requested rename failed
    pub rename_error: Option<CoreError>,
}

/// One failure inside a batch operation
#[derive(Debug)]
pub struct BatchFailure {
    pub id: i64,
    pub code: &'static str,
    pub message: String,
}

/// Batch save outcome; always complete, never stop-on-error
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BatchFailure>,
    pub cancelled: bool,
}

/// Record list filters
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// One of unmodified/modified/saved/flagged
    pub status: Option<String>,
    pub category: Option<String>,
    /// Case-insensitive free text over filename, fx name, description,
    /// keywords, category and subcategory
    pub text: Option<String>,
}

/// The repository service
pub struct FileRepository {
    db: NomenDb,
    ucs: Arc<UcsEngine>,
    settings: Arc<SettingsStore>,
    classifier: Option<Arc<dyn Classifier>>,
    model_gate: ModelGate,
    id_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl FileRepository {
    pub fn new(db: NomenDb, ucs: Arc<UcsEngine>, settings: Arc<SettingsStore>) -> Self {
        Self {
            db,
            ucs,
            settings,
            classifier: None,
            model_gate: ModelGate::new(),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn settings(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.settings)
    }

    pub fn ucs(&self) -> Arc<UcsEngine> {
        Arc::clone(&self.ucs)
    }

    /// External readiness signal from the ML subsystem
    pub fn set_model_ready(&self, ready: bool) {
        self.model_gate.set_ready(ready);
    }

    fn id_lock(&self, id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().expect("id lock table poisoned");
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load(&self, id: i64) -> CoreResult<FileRecord> {
        FileQuery::get_by_id(&self.db, id)?
            .ok_or_else(|| CoreError::FileNotFound(format!("record {id}")))
    }

    /// Attach the recomputed read model to a record.
    ///
    /// Warns (but does not fail) when a stored cat_id is unknown to the
    /// engine; the strict check happens at write time.
    fn view(&self, mut record: FileRecord) -> FileView {
        if let Some(cat_id) = record.fields.cat_id.as_deref() {
            if self.ucs.get_catid_info(cat_id).is_none() {
                log::warn!(
                    "Record {} carries unknown cat_id {:?}",
                    record.id,
                    cat_id
                );
            }
        }

        let analysis = AnalysisQuery::get(&self.db, &record.file_hash)
            .ok()
            .flatten()
            .or_else(|| {
                record
                    .analysis_hash
                    .as_deref()
                    .and_then(|hash| AnalysisQuery::get(&self.db, hash).ok().flatten())
            });

        let settings = self.settings.get();
        let suggestions = suggest::recompute(
            &record.filename,
            analysis.as_ref(),
            &settings,
            &self.ucs,
        );
        record.suggested_filename = suggestions
            .suggested_filename
            .as_ref()
            .map(|f| f.value.clone());

        FileView {
            record,
            suggestions,
        }
    }

    /// Fetch one record with suggestions
    pub fn get(&self, id: i64) -> CoreResult<FileView> {
        Ok(self.view(self.load(id)?))
    }

    /// List records matching the filter
    pub fn list(&self, filter: &ListFilter) -> CoreResult<Vec<FileView>> {
        let records = FileQuery::get_all(&self.db)?;
        let needle = filter.text.as_deref().map(str::to_lowercase);

        let views = records
            .into_iter()
            .filter(|record| match filter.status.as_deref() {
                Some("flagged") => record.flagged,
                Some(status) => record.status.as_str() == status,
                None => true,
            })
            .filter(|record| match filter.category.as_deref() {
                Some(category) => record.fields.category.as_deref() == Some(category),
                None => true,
            })
            .filter(|record| match &needle {
                Some(needle) => {
                    let mut haystacks = vec![record.filename.to_lowercase()];
                    for field in ["fx_name", "description", "keywords", "category", "subcategory"] {
                        if let Some(value) = record.fields.get(field) {
                            haystacks.push(value.to_lowercase());
                        }
                    }
                    haystacks.iter().any(|h| h.contains(needle))
                }
                None => true,
            })
            .map(|record| self.view(record))
            .collect();
        Ok(views)
    }

    /// Apply a partial metadata update to one record
    pub fn update_metadata(&self, id: i64, patch: &MetadataPatch) -> CoreResult<FileView> {
        let lock = self.id_lock(id);
        let _guard = lock.lock().expect("id lock poisoned");

        let mut record = self.load(id)?;
        self.apply_patch(&mut record, patch)?;
        FileQuery::upsert(&self.db, &record)?;
        Ok(self.view(record))
    }

    fn apply_patch(&self, record: &mut FileRecord, patch: &MetadataPatch) -> CoreResult<()> {
        // Validate up front so a bad patch leaves the record untouched
        for field in patch.fields.keys() {
            if !crate::types::FIELD_NAMES.contains(&field.as_str()) {
                return Err(CoreError::Validation(format!("unknown field {field:?}")));
            }
        }
        for tag in patch.custom_fields.keys() {
            wav::ixml::validate_custom_tag(tag)?;
        }

        for (field, value) in &patch.fields {
            let normalized = value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if record.fields.get(field).map(str::to_string) != normalized {
                record.fields.set(field, normalized);
                record.changed_fields.insert(field.clone());
            }
        }

        self.reconcile_category(record, patch)?;

        for (tag, value) in &patch.custom_fields {
            let changed = match value {
                Some(value) => {
                    record.custom_fields.insert(tag.clone(), value.clone())
                        != Some(value.clone())
                }
                None => record.custom_fields.remove(tag).is_some(),
            };
            if changed {
                record.changed_fields.insert(format!("custom:{tag}"));
            }
        }

        if let Some(rename_on_save) = patch.rename_on_save {
            record.rename_on_save = rename_on_save;
        }
        if let Some(flagged) = patch.flagged {
            record.flagged = flagged;
        }

        if record.is_dirty() {
            record.status = FileStatus::Modified;
        }
        Ok(())
    }

    /// Enforce the category invariants after a patch:
    /// (category, subcategory) is both-null or resolves to a unique cat_id,
    /// cat_id always exists in the engine, category_full is derived.
    fn reconcile_category(
        &self,
        record: &mut FileRecord,
        patch: &MetadataPatch,
    ) -> CoreResult<()> {
        let touched = ["category", "subcategory", "cat_id"]
            .iter()
            .any(|f| patch.fields.contains_key(*f));
        if !touched {
            return Ok(());
        }

        let before = record.fields.clone();

        if patch.fields.contains_key("cat_id") {
            // cat_id edits win: re-derive the pair from the engine row
            match record.fields.cat_id.as_deref() {
                Some(cat_id) => {
                    let info = self.ucs.get_catid_info(cat_id).ok_or_else(|| {
                        CoreError::Validation(format!("unknown cat_id {cat_id:?}"))
                    })?;
                    record.fields.category = Some(info.category.clone());
                    record.fields.subcategory = Some(info.subcategory.clone());
                    record.fields.category_full = Some(info.category_full.clone());
                }
                None => {
                    record.fields.category = None;
                    record.fields.subcategory = None;
                    record.fields.category_full = None;
                }
            }
        } else {
            match (
                record.fields.category.as_deref(),
                record.fields.subcategory.as_deref(),
            ) {
                (None, None) => {
                    record.fields.cat_id = None;
                    record.fields.category_full = None;
                }
                (Some(category), Some(subcategory)) => {
                    let cat_id = self
                        .ucs
                        .lookup_catid(category, subcategory)
                        .ok_or_else(|| {
                            CoreError::Validation(format!(
                                "no CatID for category {category:?} / subcategory {subcategory:?}"
                            ))
                        })?;
                    record.fields.cat_id = Some(cat_id.to_string());
                    record.fields.category_full = Some(format!("{category}-{subcategory}"));
                }
                _ => {
                    return Err(CoreError::Validation(
                        "category and subcategory must be set together".to_string(),
                    ));
                }
            }
        }

        for field in ["category", "subcategory", "cat_id", "category_full"] {
            if before.get(field) != record.fields.get(field) {
                record.changed_fields.insert(field.to_string());
            }
        }
        Ok(())
    }

    /// Copy listed fields from one record onto many.
    ///
    /// Every target ends up `Modified`, even when the copied values equal
    /// what it already held: the applied fields count as edits pending
    /// the next save.
    pub fn apply_metadata(
        &self,
        source_id: i64,
        target_ids: &[i64],
        field_names: &[String],
    ) -> CoreResult<Vec<FileView>> {
        for field in field_names {
            if !crate::types::FIELD_NAMES.contains(&field.as_str()) {
                return Err(CoreError::Validation(format!("unknown field {field:?}")));
            }
        }
        let source = self.load(source_id)?;

        let mut patch = MetadataPatch::default();
        for field in field_names {
            patch
                .fields
                .insert(field.clone(), source.fields.get(field).map(str::to_string));
        }

        let mut views = Vec::with_capacity(target_ids.len());
        for &target_id in target_ids {
            if target_id == source_id {
                continue;
            }
            let lock = self.id_lock(target_id);
            let _guard = lock.lock().expect("id lock poisoned");

            let mut record = self.load(target_id)?;
            self.apply_patch(&mut record, &patch)?;
            for field in field_names {
                record.changed_fields.insert(field.clone());
            }
            record.status = FileStatus::Modified;
            FileQuery::upsert(&self.db, &record)?;
            views.push(self.view(record));
        }
        Ok(views)
    }

    /// Drop records; the backing WAV files are untouched
    pub fn remove(&self, ids: &[i64]) -> CoreResult<()> {
        for &id in ids {
            let lock = self.id_lock(id);
            let _guard = lock.lock().expect("id lock poisoned");
            FileQuery::delete(&self.db, id)?;
        }
        Ok(())
    }

    /// Re-read a record from disk, dropping unsaved edits
    pub fn revert(&self, id: i64) -> CoreResult<FileView> {
        let lock = self.id_lock(id);
        let _guard = lock.lock().expect("id lock poisoned");

        let mut record = self.load(id)?;
        let metadata = wav::read_metadata(&record.path)?;
        record.file_hash = file_hash(&record.path)?;
        record.technical = metadata.technical;
        record.fields = metadata.fields;
        record.custom_fields = metadata.custom_fields;
        record.bext = metadata.bext;
        record.info = metadata.info;
        record.changed_fields.clear();
        record.status = FileStatus::Unmodified;

        FileQuery::upsert(&self.db, &record)?;
        Ok(self.view(record))
    }

    /// Rename target for a record, from its current category fields
    fn rename_target(&self, record: &FileRecord) -> PathBuf {
        let settings = self.settings.get();
        let parts = NameParts {
            cat_id: record.fields.cat_id.clone().unwrap_or_default(),
            user_category: record.fields.user_category.clone(),
            fx_name: record.fields.fx_name.clone(),
            creator_id: record.fields.creator_id.clone(),
            source_id: record.fields.source_id.clone(),
        };
        record.directory.join(filename::generate(&parts, &settings))
    }

    /// Save one record's metadata back into its WAV file
    pub fn save(&self, id: i64, options: &SaveOptions) -> CoreResult<SaveResult> {
        let lock = self.id_lock(id);
        let _guard = lock.lock().expect("id lock poisoned");

        let mut record = self.load(id)?;
        self.validate_for_write(&record)?;

        // Save-a-copy: the merged file lands elsewhere, the record and its
        // backing file stay as they are.
        if let Some(copy_to) = &options.copy_to {
            if copy_to.exists() {
                return Err(CoreError::RenameConflict(copy_to.clone()));
            }
            std::fs::copy(&record.path, copy_to)
                .map_err(|e| CoreError::from_io(copy_to, e))?;
            let request = WriteRequest {
                expected_hash: None,
                rename_to: None,
                fields: &record.fields,
                custom_fields: &record.custom_fields,
            };
            wav::write_metadata(copy_to, &request)?;
            return Ok(SaveResult {
                view: self.view(record),
                rename_error: None,
            });
        }

        let rename_requested = options.rename.unwrap_or(record.rename_on_save);
        let rename_to = if rename_requested {
            let target = self.rename_target(&record);
            (target != record.path).then_some(target)
        } else {
            None
        };

        let request = WriteRequest {
            expected_hash: Some(&record.file_hash),
            rename_to: rename_to.as_deref(),
            fields: &record.fields,
            custom_fields: &record.custom_fields,
        };
        let outcome = wav::write_metadata(&record.path, &request)?;

        // Refresh the record from what actually landed on disk
        let metadata = wav::read_metadata(&outcome.final_path)?;
        record.file_hash = file_hash(&outcome.final_path)?;
        record.path = outcome.final_path.clone();
        record.directory = outcome
            .final_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| record.directory.clone());
        record.filename = outcome
            .final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.filename.clone());
        record.technical = metadata.technical;
        record.bext = metadata.bext;
        record.info = metadata.info;
        record.changed_fields.clear();
        record.status = FileStatus::Saved;

        FileQuery::upsert(&self.db, &record)?;
        Ok(SaveResult {
            view: self.view(record),
            rename_error: outcome.rename_error,
        })
    }

    /// Enforce write-time invariants: a stored cat_id must exist and agree
    /// with the category pair.
    fn validate_for_write(&self, record: &FileRecord) -> CoreResult<()> {
        if let Some(cat_id) = record.fields.cat_id.as_deref() {
            let info = self
                .ucs
                .get_catid_info(cat_id)
                .ok_or_else(|| CoreError::Validation(format!("unknown cat_id {cat_id:?}")))?;
            if let (Some(category), Some(subcategory)) = (
                record.fields.category.as_deref(),
                record.fields.subcategory.as_deref(),
            ) {
                if info.category != category || info.subcategory != subcategory {
                    return Err(CoreError::Validation(format!(
                        "cat_id {cat_id:?} does not match {category}-{subcategory}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Save many records sequentially; each failure is recorded and the
    /// batch continues. Cancellation is honored between files only.
    pub fn save_batch(
        &self,
        ids: &[i64],
        rename: Option<bool>,
        cancel: Option<&AtomicBool>,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let options = SaveOptions {
            rename,
            copy_to: None,
        };

        for &id in ids {
            if let Some(cancel) = cancel {
                if cancel.load(std::sync::atomic::Ordering::Relaxed) {
                    result.cancelled = true;
                    break;
                }
            }
            match self.save(id, &options) {
                Ok(save_result) => {
                    if let Some(rename_error) = save_result.rename_error {
                        result.failed.push(BatchFailure {
                            id,
                            code: rename_error.code(),
                            message: rename_error.to_string(),
                        });
                    }
                    result.succeeded.push(id);
                }
                Err(e) => result.failed.push(BatchFailure {
                    id,
                    code: e.code(),
                    message: e.to_string(),
                }),
            }
        }
        result
    }

    /// Run the classifier for one record and cache the result by content
    /// hash. Refused until the ML subsystem signals readiness.
    pub fn analyze(&self, id: i64, options: &AnalyzeOptions) -> CoreResult<FileView> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or(CoreError::ModelNotReady)?
            .clone();
        self.model_gate.check()?;

        let lock = self.id_lock(id);
        let _guard = lock.lock().expect("id lock poisoned");

        let mut record = self.load(id)?;
        let current_hash = file_hash(&record.path)?;
        if current_hash != record.file_hash {
            return Err(CoreError::FileChanged(record.path.clone()));
        }

        let analysis = run_analysis(
            classifier.as_ref(),
            &record.path,
            &current_hash,
            options,
            chrono::Utc::now().timestamp(),
        )?;
        AnalysisQuery::put(&self.db, &analysis)?;

        record.analysis_hash = Some(current_hash);
        FileQuery::upsert(&self.db, &record)?;
        Ok(self.view(record))
    }

    /// Analyze many records on the worker pool.
    ///
    /// Different ids may run concurrently (inference dominates the cost);
    /// per-id serialization still holds through the id locks. Cancellation
    /// is honored at task start, never mid-file.
    pub fn analyze_batch(
        &self,
        ids: &[i64],
        options: &AnalyzeOptions,
        cancel: Option<&AtomicBool>,
    ) -> BatchResult {
        use rayon::prelude::*;

        enum Outcome {
            Done,
            Failed(CoreError),
            NotStarted,
        }

        let outcomes: Vec<(i64, Outcome)> = ids
            .par_iter()
            .map(|&id| {
                if cancel.is_some_and(|c| c.load(std::sync::atomic::Ordering::Relaxed)) {
                    return (id, Outcome::NotStarted);
                }
                match self.analyze(id, options) {
                    Ok(_) => (id, Outcome::Done),
                    Err(e) => (id, Outcome::Failed(e)),
                }
            })
            .collect();

        let mut result = BatchResult::default();
        for (id, outcome) in outcomes {
            match outcome {
                Outcome::Done => result.succeeded.push(id),
                Outcome::Failed(e) => result.failed.push(BatchFailure {
                    id,
                    code: e.code(),
                    message: e.to_string(),
                }),
                Outcome::NotStarted => result.cancelled = true,
            }
        }
        result
    }

    /// Wipe records and the analysis cache
    pub fn reset(&self) -> CoreResult<()> {
        FileQuery::delete_all(&self.db)?;
        AnalysisQuery::clear(&self.db)?;
        Ok(())
    }

    /// Explicit analysis-cache garbage collection
    pub fn reset_analysis_cache(&self) -> CoreResult<()> {
        AnalysisQuery::clear(&self.db)?;
        Ok(())
    }

    pub(crate) fn db(&self) -> &NomenDb {
        &self.db
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::repository;
    use super::*;
    use crate::wav::test_support::write_test_wav;

    fn import_one(repo: &FileRepository, dir: &std::path::Path, name: &str) -> i64 {
        write_test_wav(dir, name, &[]);
        let result = repo
            .import(dir, &ImportOptions::default(), None, None)
            .unwrap();
        assert_eq!(result.skipped.len(), 0);
        result
            .views
            .iter()
            .find(|v| v.record.filename == name)
            .expect("imported record")
            .record
            .id
    }

    fn patch_one(field: &str, value: &str) -> MetadataPatch {
        let mut patch = MetadataPatch::default();
        patch
            .fields
            .insert(field.to_string(), Some(value.to_string()));
        patch
    }

    #[test]
    fn test_update_marks_modified_and_tracks_fields() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");

        let view = repo
            .update_metadata(id, &patch_one("fx_name", "Door Slam"))
            .unwrap();
        assert_eq!(view.record.status, FileStatus::Modified);
        assert!(view.record.changed_fields.contains("fx_name"));
        assert_eq!(view.record.fields.fx_name.as_deref(), Some("Door Slam"));
    }

    #[test]
    fn test_category_pair_resolves_catid() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");

        let mut patch = MetadataPatch::default();
        patch.fields.insert("category".into(), Some("DOORS".into()));
        patch.fields.insert("subcategory".into(), Some("WOOD".into()));
        let view = repo.update_metadata(id, &patch).unwrap();

        assert_eq!(view.record.fields.cat_id.as_deref(), Some("DOORWood"));
        assert_eq!(view.record.fields.category_full.as_deref(), Some("DOORS-WOOD"));
    }

    #[test]
    fn test_catid_update_derives_pair() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");

        let view = repo
            .update_metadata(id, &patch_one("cat_id", "WATRFlow"))
            .unwrap();
        assert_eq!(view.record.fields.category.as_deref(), Some("WATER"));
        assert_eq!(view.record.fields.subcategory.as_deref(), Some("FLOW"));
    }

    #[test]
    fn test_category_without_subcategory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");

        let err = repo
            .update_metadata(id, &patch_one("category", "DOORS"))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // The record is untouched after the failed patch
        let view = repo.get(id).unwrap();
        assert_eq!(view.record.status, FileStatus::Unmodified);
        assert!(view.record.fields.category.is_none());
    }

    #[test]
    fn test_unknown_catid_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        let err = repo
            .update_metadata(id, &patch_one("cat_id", "XYZZY"))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        let err = repo
            .update_metadata(id, &patch_one("no_such", "x"))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_save_clears_dirty_state_and_rehashes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        let before = repo.get(id).unwrap().record.file_hash.clone();

        repo.update_metadata(id, &patch_one("fx_name", "Door Slam"))
            .unwrap();
        let result = repo.save(id, &SaveOptions::default()).unwrap();

        assert!(result.rename_error.is_none());
        assert_eq!(result.view.record.status, FileStatus::Saved);
        assert!(result.view.record.changed_fields.is_empty());
        assert_ne!(result.view.record.file_hash, before);

        // The WAV itself now carries the edit
        let metadata = wav::read_metadata(&result.view.record.path).unwrap();
        assert_eq!(metadata.fields.fx_name.as_deref(), Some("Door Slam"));
    }

    #[test]
    fn test_save_with_rename() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "raw take 7.wav");

        let mut patch = MetadataPatch::default();
        patch.fields.insert("cat_id".into(), Some("DOORWood".into()));
        patch.fields.insert("fx_name".into(), Some("Door Slam".into()));
        repo.update_metadata(id, &patch).unwrap();

        let result = repo
            .save(
                id,
                &SaveOptions {
                    rename: Some(true),
                    copy_to: None,
                },
            )
            .unwrap();

        assert_eq!(
            result.view.record.filename,
            "DOORWood_Door Slam_JD_NOM.wav"
        );
        assert!(result.view.record.path.exists());
        assert!(!dir.path().join("raw take 7.wav").exists());
    }

    #[test]
    fn test_save_rename_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "old.wav");
        write_test_wav(dir.path(), "DOORWood_Door Slam_JD_NOM.wav", &[]);

        let mut patch = MetadataPatch::default();
        patch.fields.insert("cat_id".into(), Some("DOORWood".into()));
        patch.fields.insert("fx_name".into(), Some("Door Slam".into()));
        repo.update_metadata(id, &patch).unwrap();

        let err = repo
            .save(
                id,
                &SaveOptions {
                    rename: Some(true),
                    copy_to: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "RENAME_CONFLICT");

        // Original untouched, still dirty
        let view = repo.get(id).unwrap();
        assert_eq!(view.record.status, FileStatus::Modified);
    }

    #[test]
    fn test_save_detects_external_modification() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        repo.update_metadata(id, &patch_one("fx_name", "Slam"))
            .unwrap();

        let path = repo.get(id).unwrap().record.path;
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[50] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = repo.save(id, &SaveOptions::default()).unwrap_err();
        assert_eq!(err.code(), "FILE_CHANGED");
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_revert_drops_edits() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        repo.update_metadata(id, &patch_one("fx_name", "Slam"))
            .unwrap();

        let view = repo.revert(id).unwrap();
        assert_eq!(view.record.status, FileStatus::Unmodified);
        assert!(view.record.changed_fields.is_empty());
        assert!(view.record.fields.fx_name.is_none());
    }

    #[test]
    fn test_flagged_composes_with_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");

        let mut patch = MetadataPatch::default();
        patch.flagged = Some(true);
        let view = repo.update_metadata(id, &patch).unwrap();
        // Flagging alone is not a metadata edit
        assert!(view.record.flagged);
        assert_eq!(view.record.status, FileStatus::Unmodified);

        repo.update_metadata(id, &patch_one("notes", "check levels"))
            .unwrap();
        let view = repo.get(id).unwrap();
        assert!(view.record.flagged);
        assert_eq!(view.record.status, FileStatus::Modified);

        let flagged = repo
            .list(&ListFilter {
                status: Some("flagged".into()),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn test_list_filters() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id_a = import_one(&repo, dir.path(), "door_a.wav");
        let _id_b = import_one(&repo, dir.path(), "water_b.wav");

        let mut patch = MetadataPatch::default();
        patch.fields.insert("category".into(), Some("DOORS".into()));
        patch.fields.insert("subcategory".into(), Some("WOOD".into()));
        repo.update_metadata(id_a, &patch).unwrap();

        let by_category = repo
            .list(&ListFilter {
                category: Some("DOORS".into()),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].record.id, id_a);

        let by_text = repo
            .list(&ListFilter {
                text: Some("WATER".into()),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].record.filename, "water_b.wav");

        let modified = repo
            .list(&ListFilter {
                status: Some("modified".into()),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(modified.len(), 1);
    }

    #[test]
    fn test_apply_metadata_to_many() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let source = import_one(&repo, dir.path(), "src.wav");
        let t1 = import_one(&repo, dir.path(), "t1.wav");
        let t2 = import_one(&repo, dir.path(), "t2.wav");

        repo.update_metadata(source, &patch_one("library", "Nomen SFX"))
            .unwrap();
        repo.update_metadata(source, &patch_one("designer", "JD"))
            .unwrap();

        let views = repo
            .apply_metadata(
                source,
                &[t1, t2],
                &["library".to_string(), "designer".to_string()],
            )
            .unwrap();
        assert_eq!(views.len(), 2);
        for view in views {
            assert_eq!(view.record.fields.library.as_deref(), Some("Nomen SFX"));
            assert_eq!(view.record.status, FileStatus::Modified);
        }
    }

    #[test]
    fn test_apply_metadata_marks_matching_targets_modified() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let source = import_one(&repo, dir.path(), "src.wav");
        let target = import_one(&repo, dir.path(), "t.wav");

        repo.update_metadata(source, &patch_one("library", "Nomen SFX"))
            .unwrap();
        // Target already carries the exact value being applied, and is clean
        repo.update_metadata(target, &patch_one("library", "Nomen SFX"))
            .unwrap();
        repo.save(target, &SaveOptions::default()).unwrap();
        assert_eq!(repo.get(target).unwrap().record.status, FileStatus::Saved);

        let views = repo
            .apply_metadata(source, &[target], &["library".to_string()])
            .unwrap();
        assert_eq!(views[0].record.status, FileStatus::Modified);
        assert!(views[0].record.changed_fields.contains("library"));
    }

    #[test]
    fn test_remove_keeps_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        let path = repo.get(id).unwrap().record.path;

        repo.remove(&[id]).unwrap();
        assert_eq!(repo.get(id).unwrap_err().code(), "FILE_NOT_FOUND");
        assert!(path.exists());
    }

    #[test]
    fn test_save_batch_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let good = import_one(&repo, dir.path(), "good.wav");
        repo.update_metadata(good, &patch_one("fx_name", "Slam"))
            .unwrap();

        let result = repo.save_batch(&[9999, good], None, None);
        assert_eq!(result.succeeded, vec![good]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].code, "FILE_NOT_FOUND");
        assert!(!result.cancelled);
    }

    #[test]
    fn test_analyze_requires_ready_model() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        let id = import_one(&repo, dir.path(), "a.wav");
        let err = repo.analyze(id, &AnalyzeOptions::default()).unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_READY");
    }

    #[test]
    fn test_analyze_caches_and_suggests() {
        use crate::analysis::test_support::FakeClassifier;
        use crate::types::ClassificationHit;

        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(FakeClassifier {
            hits: vec![ClassificationHit {
                cat_id: "DOORWood".into(),
                confidence: 0.95,
            }],
            caption: Some("a wooden door slams".into()),
            fail: false,
        });
        let repo = repository(dir.path()).with_classifier(classifier);
        repo.set_model_ready(true);
        let id = import_one(&repo, dir.path(), "a.wav");

        let view = repo.analyze(id, &AnalyzeOptions::default()).unwrap();
        assert_eq!(
            view.suggestions.cat_id.as_ref().map(|f| f.value.as_str()),
            Some("DOORWood")
        );
        assert_eq!(
            view.suggestions.description.as_ref().map(|f| f.value.as_str()),
            Some("A wooden door slams")
        );
        assert!(view
            .record
            .suggested_filename
            .as_deref()
            .unwrap()
            .starts_with("DOORWood_"));

        // Cached: a fresh read recomputes suggestions from the cache
        let view = repo.get(id).unwrap();
        assert!(view.suggestions.cat_id.is_some());
    }

    #[test]
    fn test_suggestions_track_settings_changes() {
        use crate::analysis::test_support::FakeClassifier;
        use crate::types::ClassificationHit;

        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(FakeClassifier {
            hits: vec![ClassificationHit {
                cat_id: "DOORWood".into(),
                confidence: 0.95,
            }],
            caption: None,
            fail: false,
        });
        let repo = repository(dir.path()).with_classifier(classifier);
        repo.set_model_ready(true);
        let id = import_one(&repo, dir.path(), "a.wav");
        repo.analyze(id, &AnalyzeOptions::default()).unwrap();

        let name = repo.get(id).unwrap().record.suggested_filename.unwrap();
        assert!(name.ends_with("_JD_NOM.wav"));

        let store = repo.settings();
        let mut settings = store.get();
        settings.creator_id = "ZZ".into();
        store.update(settings).unwrap();

        // No re-analysis, no save: the next read reflects the new settings
        let name = repo.get(id).unwrap().record.suggested_filename.unwrap();
        assert!(name.ends_with("_ZZ_NOM.wav"));
    }

    #[test]
    fn test_reset_wipes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(dir.path());
        import_one(&repo, dir.path(), "a.wav");
        repo.reset().unwrap();
        assert!(repo.list(&ListFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_updates_serialize_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(repository(dir.path()));
        let id = import_one(&repo, dir.path(), "a.wav");

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(std::thread::spawn(move || {
                let mut patch = MetadataPatch::default();
                patch
                    .fields
                    .insert("notes".into(), Some(format!("writer-{i}")));
                repo.update_metadata(id, &patch).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // The final value is exactly one of the writers' values
        let view = repo.get(id).unwrap();
        let notes = view.record.fields.notes.unwrap();
        assert!(notes.starts_with("writer-"));
        assert_eq!(view.record.status, FileStatus::Modified);
    }
}
