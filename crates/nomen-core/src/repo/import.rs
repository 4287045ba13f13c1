//! Directory import pipeline
//!
//! Scans a directory for `*.wav` files and reconciles them with the store:
//! unchanged files (by content fingerprint) are returned as-is, renamed
//! files are re-pointed, changed or new files are read fresh, and records
//! whose backing file vanished are dropped. Progress flows over an mpsc
//! channel; a cancellation flag is honored between files.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use walkdir::WalkDir;

use super::{FileRepository, FileView};
use crate::db::FileQuery;
use crate::error::CoreResult;
use crate::filename::{self, ParseOutcome};
use crate::hash::file_hash;
use crate::types::{FileRecord, FileStatus};
use crate::wav;

/// Import options
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Descend into subdirectories
    pub recursive: bool,
}

/// Progress events emitted during an import
#[derive(Debug, Clone)]
pub enum ImportEvent {
    Started { total: usize },
    Imported { path: PathBuf },
    Skipped { path: PathBuf, reason: String },
    Finished { imported: usize, skipped: usize, removed: usize },
}

/// A file the import could not take in
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one import run
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Views of every record backed by a scanned file
    pub views: Vec<FileView>,
    pub skipped: Vec<SkippedFile>,
    /// Ids of records whose backing file no longer exists
    pub removed: Vec<i64>,
    pub cancelled: bool,
}

impl ImportResult {
    fn is_empty(&self) -> bool {
        self.views.is_empty() && self.skipped.is_empty() && self.removed.is_empty()
    }
}

/// Stable record id derived from the import path (kept across renames
/// because updates address records by id, never by re-derivation)
fn record_id_for_path(path: &Path) -> i64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() as i64).abs()
}

fn send(progress: Option<&Sender<ImportEvent>>, event: ImportEvent) {
    if let Some(progress) = progress {
        // A dropped receiver just means nobody is watching
        let _ = progress.send(event);
    }
}

impl FileRepository {
    /// Import a directory of WAV files
    pub fn import(
        &self,
        directory: &Path,
        options: &ImportOptions,
        cancel: Option<&AtomicBool>,
        progress: Option<&Sender<ImportEvent>>,
    ) -> CoreResult<ImportResult> {
        let max_depth = if options.recursive { usize::MAX } else { 1 };
        let mut wav_paths: Vec<PathBuf> = WalkDir::new(directory)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .collect();
        wav_paths.sort();

        log::info!(
            "import: scanning {:?} ({} wav files, recursive={})",
            directory,
            wav_paths.len(),
            options.recursive
        );
        send(progress, ImportEvent::Started { total: wav_paths.len() });

        let mut result = ImportResult::default();

        for path in wav_paths {
            if let Some(cancel) = cancel {
                if cancel.load(Ordering::Relaxed) {
                    log::info!("import: cancelled before {:?}", path);
                    result.cancelled = true;
                    break;
                }
            }
            match self.import_one(&path) {
                Ok(view) => {
                    send(progress, ImportEvent::Imported { path });
                    result.views.push(view);
                }
                Err(e) => {
                    log::warn!("import: skipping {:?}: {}", path, e);
                    send(
                        progress,
                        ImportEvent::Skipped {
                            path: path.clone(),
                            reason: e.code().to_string(),
                        },
                    );
                    result.skipped.push(SkippedFile {
                        path,
                        reason: e.code().to_string(),
                    });
                }
            }
        }

        // Stale sweep runs after the per-file pass so a renamed file has
        // already re-pointed its record and is not treated as missing.
        if !result.cancelled {
            for record in FileQuery::get_all(self.db())? {
                if !record.path.exists() {
                    log::info!(
                        "import: dropping record {} for missing file {:?}",
                        record.id,
                        record.path
                    );
                    FileQuery::delete(self.db(), record.id)?;
                    result.removed.push(record.id);
                }
            }
        }

        if result.is_empty() {
            log::info!("import: nothing to do in {:?}", directory);
        }
        send(
            progress,
            ImportEvent::Finished {
                imported: result.views.len(),
                skipped: result.skipped.len(),
                removed: result.removed.len(),
            },
        );
        Ok(result)
    }

    fn import_one(&self, path: &Path) -> CoreResult<FileView> {
        let hash = file_hash(path)?;

        // Unchanged content: hand the existing record back; a rename on
        // disk keeps the hash, so re-point the record at the new path.
        if let Some(mut existing) = FileQuery::get_by_hash(self.db(), &hash)? {
            if existing.path != path {
                log::info!(
                    "import: {:?} moved from {:?}, keeping record {}",
                    path,
                    existing.path,
                    existing.id
                );
                existing.path = path.to_path_buf();
                existing.directory = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| existing.directory.clone());
                existing.filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| existing.filename.clone());
                FileQuery::upsert(self.db(), &existing)?;
            }
            return Ok(self.view(existing));
        }

        let metadata = wav::read_metadata(path)?;

        // Same path, different content: the file changed externally.
        // Re-read wholesale but keep the record identity.
        let (id, analysis_hash, rename_on_save) =
            match FileQuery::get_by_path(self.db(), &path.to_string_lossy())? {
                Some(previous) => (previous.id, previous.analysis_hash, previous.rename_on_save),
                None => {
                    let mut id = record_id_for_path(path);
                    // Path-hash collisions are vanishingly rare; probe past one
                    while FileQuery::get_by_id(self.db(), id)?
                        .is_some_and(|other| other.path != path)
                    {
                        id += 1;
                    }
                    (
                        id,
                        None,
                        self.settings.get().rename_on_save_default,
                    )
                }
            };

        let mut record = FileRecord {
            id,
            path: path.to_path_buf(),
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            status: FileStatus::Unmodified,
            flagged: false,
            file_hash: hash,
            technical: metadata.technical,
            fields: metadata.fields,
            custom_fields: metadata.custom_fields,
            bext: metadata.bext,
            info: metadata.info,
            changed_fields: Default::default(),
            suggested_filename: None,
            rename_on_save,
            analysis_hash,
        };

        self.enrich_from_filename(&mut record);

        FileQuery::upsert(self.db(), &record)?;
        Ok(self.view(record))
    }

    /// Fill-only enrichment from a UCS-conforming filename: chunk metadata
    /// always wins, the filename only supplies what the chunks lack.
    fn enrich_from_filename(&self, record: &mut FileRecord) {
        let ParseOutcome::Parsed(parsed) = filename::parse(&record.filename, &self.ucs) else {
            return;
        };

        if record.fields.cat_id.is_none() {
            if let Some(info) = self.ucs.get_catid_info(&parsed.cat_id) {
                record.fields.cat_id = Some(info.cat_id.clone());
                record.fields.category = Some(info.category.clone());
                record.fields.subcategory = Some(info.subcategory.clone());
                record.fields.category_full = Some(info.category_full.clone());
            }
        }
        if record.fields.fx_name.is_none() && !parsed.fx_name.is_empty() {
            record.fields.fx_name = Some(parsed.fx_name.clone());
        }
        if record.fields.user_category.is_none() {
            record.fields.user_category = parsed.user_category.clone();
        }
        if record.fields.creator_id.is_none() {
            record.fields.creator_id = parsed.creator_id.clone();
        }
        if record.fields.source_id.is_none() {
            record.fields.source_id = parsed.source_id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::repository;
    use super::*;
    use crate::repo::MetadataPatch;
    use crate::wav::test_support::write_test_wav;
    use std::sync::mpsc;

    #[test]
    fn test_import_scans_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        write_test_wav(dir.path(), "a.wav", &[]);
        write_test_wav(dir.path(), "b.wav", &[]);
        std::fs::write(dir.path().join("broken.wav"), b"not riff at all").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let repo = repository(dir.path());
        let result = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();

        assert_eq!(result.views.len(), 2);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, "INVALID_WAV");
        assert!(!result.cancelled);
    }

    #[test]
    fn test_reimport_keeps_unchanged_records_and_edits() {
        let dir = tempfile::tempdir().unwrap();
        write_test_wav(dir.path(), "a.wav", &[]);
        let repo = repository(dir.path());

        let first = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        let id = first.views[0].record.id;

        let mut patch = MetadataPatch::default();
        patch.fields.insert("notes".into(), Some("keep me".into()));
        repo.update_metadata(id, &patch).unwrap();

        let second = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        let record = &second.views[0].record;
        assert_eq!(record.id, id);
        assert_eq!(record.fields.notes.as_deref(), Some("keep me"));
        assert_eq!(record.status, crate::types::FileStatus::Modified);
    }

    #[test]
    fn test_externally_changed_file_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(dir.path(), "a.wav", &[]);
        let repo = repository(dir.path());

        let first = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        let id = first.views[0].record.id;
        let mut patch = MetadataPatch::default();
        patch.fields.insert("notes".into(), Some("stale".into()));
        repo.update_metadata(id, &patch).unwrap();

        // Another process rewrites the file
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[40] ^= 0x55;
        std::fs::write(&path, &bytes).unwrap();

        let second = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        let record = &second.views[0].record;
        assert_eq!(record.id, id, "identity survives an external rewrite");
        assert!(record.fields.notes.is_none(), "stale edits dropped");
        assert_eq!(record.status, crate::types::FileStatus::Unmodified);
    }

    #[test]
    fn test_rename_on_disk_repoints_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(dir.path(), "a.wav", &[]);
        let repo = repository(dir.path());

        let first = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        let id = first.views[0].record.id;

        let renamed = dir.path().join("renamed.wav");
        std::fs::rename(&path, &renamed).unwrap();

        let second = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        assert_eq!(second.views.len(), 1);
        assert_eq!(second.views[0].record.id, id);
        assert_eq!(second.views[0].record.filename, "renamed.wav");
        assert!(second.removed.is_empty(), "renamed file is not stale");
    }

    #[test]
    fn test_missing_files_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(dir.path(), "a.wav", &[]);
        write_test_wav(dir.path(), "b.wav", &[]);
        let repo = repository(dir.path());

        let first = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        let gone_id = first
            .views
            .iter()
            .find(|v| v.record.filename == "a.wav")
            .unwrap()
            .record
            .id;

        std::fs::remove_file(&path).unwrap();
        let second = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();
        assert_eq!(second.views.len(), 1);
        assert_eq!(second.removed, vec![gone_id]);
    }

    #[test]
    fn test_recursive_flag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("deep")).unwrap();
        write_test_wav(&dir.path().join("deep"), "nested.wav", &[]);
        let repo = repository(dir.path());

        let flat = repo
            .import(dir.path(), &ImportOptions { recursive: false }, None, None)
            .unwrap();
        assert!(flat.views.is_empty());

        let deep = repo
            .import(dir.path(), &ImportOptions { recursive: true }, None, None)
            .unwrap();
        assert_eq!(deep.views.len(), 1);
        assert_eq!(deep.views[0].record.filename, "nested.wav");
    }

    #[test]
    fn test_filename_enrichment_fill_only() {
        let dir = tempfile::tempdir().unwrap();
        write_test_wav(dir.path(), "DOORWood_Door Slam_AB_LIB.wav", &[]);
        // This file's chunks already carry a category; the filename must not
        // override it
        let ixml = b"<BWFXML><USER><CATID>WATRFlow</CATID><CATEGORY>WATER</CATEGORY><SUBCATEGORY>FLOW</SUBCATEGORY></USER></BWFXML>";
        write_test_wav(dir.path(), "DOORMetl_Clank_AB_LIB.wav", &[(b"iXML", ixml)]);

        let repo = repository(dir.path());
        let result = repo
            .import(dir.path(), &ImportOptions::default(), None, None)
            .unwrap();

        let plain = result
            .views
            .iter()
            .find(|v| v.record.filename.starts_with("DOORWood"))
            .unwrap();
        assert_eq!(plain.record.fields.cat_id.as_deref(), Some("DOORWood"));
        assert_eq!(plain.record.fields.category.as_deref(), Some("DOORS"));
        assert_eq!(plain.record.fields.fx_name.as_deref(), Some("Door Slam"));
        assert_eq!(plain.record.fields.creator_id.as_deref(), Some("AB"));

        let tagged = result
            .views
            .iter()
            .find(|v| v.record.filename.starts_with("DOORMetl"))
            .unwrap();
        assert_eq!(tagged.record.fields.cat_id.as_deref(), Some("WATRFlow"));
        // fx_name was absent in chunks, so the filename supplies it
        assert_eq!(tagged.record.fields.fx_name.as_deref(), Some("Clank"));
    }

    #[test]
    fn test_cancellation_between_files() {
        let dir = tempfile::tempdir().unwrap();
        write_test_wav(dir.path(), "a.wav", &[]);
        let repo = repository(dir.path());

        let cancel = AtomicBool::new(true);
        let result = repo
            .import(dir.path(), &ImportOptions::default(), Some(&cancel), None)
            .unwrap();
        assert!(result.cancelled);
        assert!(result.views.is_empty());
    }

    #[test]
    fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        write_test_wav(dir.path(), "a.wav", &[]);
        let repo = repository(dir.path());

        let (tx, rx) = mpsc::channel();
        repo.import(dir.path(), &ImportOptions::default(), None, Some(&tx))
            .unwrap();
        drop(tx);

        let events: Vec<ImportEvent> = rx.iter().collect();
        assert!(matches!(events.first(), Some(ImportEvent::Started { total: 1 })));
        assert!(matches!(
            events.last(),
            Some(ImportEvent::Finished { imported: 1, skipped: 0, removed: 0 })
        ));
    }
}
