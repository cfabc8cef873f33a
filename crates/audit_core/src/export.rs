use crate::error::{AuditError, Result};
use crate::schema::AuditEntry;
use crate::window::sort_newest_first;
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Pretty JSON array of the full history, newest first.
///
/// The output is a valid import file: importing it into an empty store
/// reproduces the same set of entries.
pub fn export_history(entries: &[AuditEntry], local: UtcOffset) -> Result<String> {
    let mut ordered = entries.to_vec();
    sort_newest_first(&mut ordered, local);
    serde_json::to_string_pretty(&ordered)
        .map_err(|e| AuditError::StorageUnavailable(format!("cannot serialize history: {e}")))
}

/// `audit_history_export_<YYYY-MM-DD>.json` for the date of `now`.
pub fn export_file_name(now: OffsetDateTime) -> String {
    let date = now
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| now.date().to_string());
    format!("audit_history_export_{date}.json")
}

/// Writes the export into `out_dir` under the default file name and returns its path.
pub fn write_export(entries: &[AuditEntry], out_dir: &Path, now: OffsetDateTime) -> Result<PathBuf> {
    let json = export_history(entries, now.offset())?;
    fs::create_dir_all(out_dir).map_err(|e| io_error(out_dir, e))?;
    let path = out_dir.join(export_file_name(now));
    fs::write(&path, json).map_err(|e| io_error(&path, e))?;
    tracing::info!(path = %path.display(), entries = entries.len(), "Exported history");
    Ok(path)
}

fn io_error(path: &Path, err: std::io::Error) -> AuditError {
    AuditError::StorageUnavailable(format!("{}: {err}", path.display()))
}
