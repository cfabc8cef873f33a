//! Merging exported audit files into the local store.
//!
//! Each file is validated on its own; a bad file is reported and skipped.
//! Entries from good files overwrite local entries with the same id, in the
//! order the files are given. The merged set is written back in a single
//! transaction, so a storage failure leaves the store as it was.

use crate::db::AuditStore;
use crate::error::{AuditError, Result};
use crate::schema::AuditEntry;
use crate::window::{parse_timestamp, sort_newest_first};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use time::UtcOffset;

#[derive(Debug, Clone)]
pub struct ImportFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files_processed: usize,
    pub new_records: usize,
    pub updated_records: usize,
    pub failed_files: Vec<FailedFile>,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully processed {} file(s).\n- {} new audit(s) added.\n- {} existing audit(s) updated/overwritten.",
            self.files_processed, self.new_records, self.updated_records
        )?;
        if !self.failed_files.is_empty() {
            let names: Vec<&str> = self.failed_files.iter().map(|f| f.name.as_str()).collect();
            write!(
                f,
                "\n\nFailed to process {} file(s): {}. Please check if they are valid JSON files.",
                self.failed_files.len(),
                names.join(", ")
            )?;
            for failed in &self.failed_files {
                write!(f, "\n- {}: {}", failed.name, failed.reason)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    /// Full merged history, newest first.
    pub history: Vec<AuditEntry>,
}

pub fn import_files(store: &mut AuditStore, files: &[ImportFile]) -> Result<ImportOutcome> {
    if files.is_empty() {
        return Err(AuditError::InvalidArgument(
            "No files selected for import.".to_string(),
        ));
    }
    let sources: Vec<std::result::Result<&ImportFile, FailedFile>> = files.iter().map(Ok).collect();
    import_batch(store, sources)
}

/// Reads each path first; unreadable files are reported like malformed ones.
pub fn import_paths<P: AsRef<Path>>(store: &mut AuditStore, paths: &[P]) -> Result<ImportOutcome> {
    if paths.is_empty() {
        return Err(AuditError::InvalidArgument(
            "No files selected for import.".to_string(),
        ));
    }

    let loaded: Vec<std::result::Result<ImportFile, FailedFile>> = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let name = ImportFile::display_name(path);
            fs::read(path)
                .map(|contents| ImportFile::new(name.clone(), contents))
                .map_err(|e| FailedFile {
                    name,
                    reason: format!("cannot read file: {e}"),
                })
        })
        .collect();

    let sources = loaded
        .iter()
        .map(|loaded| loaded.as_ref().map_err(Clone::clone))
        .collect();
    import_batch(store, sources)
}

fn import_batch(
    store: &mut AuditStore,
    sources: Vec<std::result::Result<&ImportFile, FailedFile>>,
) -> Result<ImportOutcome> {
    let mut merged: HashMap<i64, AuditEntry> = store
        .get_all()?
        .into_iter()
        .map(|entry| (entry.id, entry))
        .collect();

    let mut summary = ImportSummary::default();
    for source in sources {
        let file = match source {
            Ok(file) => file,
            Err(failed) => {
                tracing::warn!(file = %failed.name, reason = %failed.reason, "Skipping import file");
                summary.failed_files.push(failed);
                continue;
            }
        };

        match parse_file(file) {
            Ok(entries) => {
                for entry in entries {
                    if merged.contains_key(&entry.id) {
                        summary.updated_records += 1;
                    } else {
                        summary.new_records += 1;
                    }
                    merged.insert(entry.id, entry);
                }
                summary.files_processed += 1;
            }
            Err(err) => {
                tracing::warn!(file = %file.name, error = %err, "Skipping import file");
                let reason = match err {
                    AuditError::InvalidImportFormat { reason, .. } => reason,
                    other => other.to_string(),
                };
                summary.failed_files.push(FailedFile {
                    name: file.name.clone(),
                    reason,
                });
            }
        }
    }

    let mut history: Vec<AuditEntry> = merged.into_values().collect();
    history.sort_by_key(|entry| entry.id);
    store.bulk_upsert(&history)?;
    sort_newest_first(&mut history, UtcOffset::UTC);

    tracing::info!(
        files = summary.files_processed,
        new = summary.new_records,
        updated = summary.updated_records,
        failed = summary.failed_files.len(),
        "Import finished"
    );
    Ok(ImportOutcome { summary, history })
}

/// All entries of one file, or the reason the whole file is rejected.
pub fn parse_file(file: &ImportFile) -> Result<Vec<AuditEntry>> {
    let invalid = |reason: String| AuditError::InvalidImportFormat {
        file: file.name.clone(),
        reason,
    };

    let document: Value = serde_json::from_slice(&file.contents)
        .map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let Value::Array(items) = document else {
        return Err(invalid(
            "it must be an array of audit entries".to_string(),
        ));
    };

    let mut rng = rand::thread_rng();
    let mut entries = Vec::with_capacity(items.len());
    for (index, mut item) in items.into_iter().enumerate() {
        let Some(object) = item.as_object_mut() else {
            return Err(invalid(format!("element {index} is not an object")));
        };
        if !object.contains_key("id") || !object.contains_key("timestamp") {
            return Err(invalid(format!(
                "element {index} is missing a required id or timestamp"
            )));
        }

        let has_usable_id = match object.get("id") {
            Some(Value::Null) => false,
            Some(Value::Number(n)) => n.as_i64() != Some(0),
            _ => true,
        };
        if !has_usable_id {
            let id = synthesize_id(object.get("timestamp"), rng.gen_range(0..1000))
                .ok_or_else(|| {
                    invalid(format!(
                        "element {index} has no id and an unreadable timestamp"
                    ))
                })?;
            tracing::debug!(file = %file.name, index, id, "Synthesized missing id");
            object.insert("id".to_string(), Value::from(id));
        }

        let entry: AuditEntry = serde_json::from_value(item)
            .map_err(|e| invalid(format!("element {index}: {e}")))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Legacy exports may lack an id: derive one from the timestamp plus a tie-breaker.
fn synthesize_id(timestamp: Option<&Value>, jitter: i64) -> Option<i64> {
    let raw = timestamp?.as_str()?;
    let ts = parse_timestamp(raw, UtcOffset::UTC)?;
    let millis = i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).ok()?;
    Some(millis + jitter)
}
