//! Whole-file replacement of the ledger workbook, with a timestamped backup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::db::xlsx::write_atomically;
use crate::error::StorageError;

fn backup_name(path: &Path, stamp: &str, attempt: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let suffix = if attempt == 0 {
        String::new()
    } else {
        format!("-{attempt}")
    };
    let name = match path.extension() {
        Some(ext) => format!("{stem}-backup-{stamp}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}-backup-{stamp}{suffix}"),
    };
    path.with_file_name(name)
}

/// Copy `path` to `<stem>-backup-<YYYYMMDDHHMMSS>.<ext>` beside it.
///
/// Returns `None` when there is no file to back up. A backup taken in the same
/// second as an earlier one gets a numeric suffix instead of replacing it.
pub fn backup_existing(path: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = now.format("%Y%m%d%H%M%S").to_string();
    let mut attempt = 0;
    let mut target = backup_name(path, &stamp, attempt);
    while target.exists() {
        attempt += 1;
        target = backup_name(path, &stamp, attempt);
    }

    std::fs::copy(path, &target).map_err(|source| StorageError::Io {
        path: target.clone(),
        source,
    })?;
    Ok(Some(target))
}

/// Back up the current workbook (if any) and atomically write `bytes` in its place.
pub fn replace_workbook(
    path: &Path,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>, StorageError> {
    let backup = backup_existing(path, now)?;
    write_atomically(path, bytes)?;
    match &backup {
        Some(backup) => tracing::info!(
            "Replaced workbook {:?}; previous copy kept at {:?}",
            path,
            backup
        ),
        None => tracing::info!("Installed workbook {:?}", path),
    }
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::{backup_existing, replace_workbook};

    #[test]
    fn nothing_to_back_up_for_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 8, 30, 5).unwrap();
        let backup = backup_existing(&dir.path().join("QE-02-01.xlsx"), now).expect("backup");
        assert!(backup.is_none());
    }

    #[test]
    fn replace_keeps_timestamped_copy_of_previous_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("QE-02-01.xlsx");
        std::fs::write(&path, b"old").expect("seed");
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 8, 30, 5).unwrap();

        let backup = replace_workbook(&path, b"new", now)
            .expect("replace")
            .expect("backup path");

        assert_eq!(
            backup.file_name().and_then(|name| name.to_str()),
            Some("QE-02-01-backup-20251201083005.xlsx")
        );
        assert_eq!(std::fs::read(&backup).expect("read backup"), b"old");
        assert_eq!(std::fs::read(&path).expect("read current"), b"new");
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.xlsx");
        std::fs::write(&path, b"v1").expect("seed");
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let first = backup_existing(&path, now).expect("first").expect("path");
        let second = backup_existing(&path, now).expect("second").expect("path");

        assert_ne!(first, second);
        assert_eq!(
            second.file_name().and_then(|name| name.to_str()),
            Some("ledger-backup-20250102030405-1.xlsx")
        );
    }
}
