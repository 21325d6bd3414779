use crate::checksum::checksum_file;
use crate::planner::OperationKind;
use crate::transaction::{LoggedOperation, TransactionLog, TransactionStatus};
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Preconditions that stop a rollback before any filesystem touch.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("transaction log not found: {0}")]
    NotFound(PathBuf),
    #[error("cannot roll back a dry run")]
    DryRun,
    #[error("transaction is not completed (status: {0:?})")]
    NotCompleted(TransactionStatus),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub success: bool,
    pub files_restored: usize,
    pub files_failed: usize,
    pub directories_removed: usize,
    pub errors: Vec<String>,
}

/// Undoes a completed run from its persisted log. Operations are undone
/// in reverse order; partial state is tolerated and reported rather than
/// aborting, so a rollback can be meaningful even after external edits.
pub fn rollback(log_path: &Path) -> Result<RollbackResult, RollbackError> {
    if !log_path.exists() {
        return Err(RollbackError::NotFound(log_path.to_path_buf()));
    }
    let mut log = TransactionLog::load(log_path).map_err(RollbackError::Other)?;
    if log.is_dry_run {
        return Err(RollbackError::DryRun);
    }
    if log.status != TransactionStatus::Completed {
        return Err(RollbackError::NotCompleted(log.status));
    }

    let mut restored = 0usize;
    let mut failed = 0usize;
    let mut errors = Vec::new();

    for entry in log.operations.iter().rev() {
        match undo_operation(entry) {
            Ok(()) => restored += 1,
            Err(message) => {
                tracing::warn!("rollback: {message}");
                failed += 1;
                errors.push(message);
            }
        }
    }

    let mut directories_removed = 0usize;
    for directory in log.created_directories.iter().rev() {
        if remove_if_empty(directory) {
            directories_removed += 1;
        }
    }

    log.mark_rolled_back();
    log.save_to(log_path)
        .context("failed to rewrite transaction log")
        .map_err(RollbackError::Other)?;

    Ok(RollbackResult {
        success: failed == 0,
        files_restored: restored,
        files_failed: failed,
        directories_removed,
        errors,
    })
}

fn undo_operation(entry: &LoggedOperation) -> Result<(), String> {
    match entry.operation {
        OperationKind::Copy => undo_copy(entry),
        OperationKind::Move => undo_move(entry),
    }
}

/// A copy is undone by deleting the destination, but only when its
/// content still matches what the log asserts. Size is checked first;
/// a recorded checksum is verified too.
fn undo_copy(entry: &LoggedOperation) -> Result<(), String> {
    let destination = &entry.destination_path;
    let metadata = fs::metadata(destination).map_err(|_| {
        format!(
            "copied file missing at rollback: {}",
            destination.display()
        )
    })?;
    if metadata.len() != entry.file_size {
        return Err(format!(
            "size mismatch, leaving {} in place (expected {} bytes, found {})",
            destination.display(),
            entry.file_size,
            metadata.len()
        ));
    }
    if let Some(expected) = &entry.checksum {
        let actual = checksum_file(destination)
            .map_err(|err| format!("could not verify {}: {err:#}", destination.display()))?;
        if &actual != expected {
            return Err(format!(
                "checksum mismatch, leaving {} in place",
                destination.display()
            ));
        }
    }

    fs::remove_file(destination)
        .map_err(|err| format!("failed to delete {}: {err}", destination.display()))
}

/// A move is undone by moving the file back, recreating source parents as
/// needed. A missing destination is reported; partial state is expected.
fn undo_move(entry: &LoggedOperation) -> Result<(), String> {
    let destination = &entry.destination_path;
    let source = &entry.source_path;

    if !destination.exists() {
        return Err(format!(
            "moved file missing at rollback: {}",
            destination.display()
        ));
    }
    if source.exists() {
        return Err(format!(
            "original path already occupied: {}",
            source.display()
        ));
    }
    if let Some(parent) = source.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to recreate {}: {err}", parent.display()))?;
    }

    fs::rename(destination, source).map_err(|err| {
        format!(
            "failed to move back {} -> {}: {err}",
            destination.display(),
            source.display()
        )
    })
}

fn remove_if_empty(directory: &Path) -> bool {
    let Ok(mut entries) = fs::read_dir(directory) else {
        return false;
    };
    if entries.next().is_some() {
        return false;
    }
    fs::remove_dir(directory).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn entry(
        source: &Path,
        destination: &Path,
        kind: OperationKind,
        size: u64,
        checksum: Option<String>,
    ) -> LoggedOperation {
        LoggedOperation {
            source_path: source.to_path_buf(),
            destination_path: destination.to_path_buf(),
            operation: kind,
            file_size: size,
            timestamp: Utc::now(),
            checksum,
        }
    }

    fn completed_log() -> TransactionLog {
        let mut log = TransactionLog::begin(Path::new("/src"), "{name}{ext}", false);
        log.complete();
        log
    }

    #[test]
    fn missing_log_is_a_precondition_error() {
        let result = rollback(Path::new("/nonexistent/photocopy-x.json"));
        assert!(matches!(result, Err(RollbackError::NotFound(_))));
    }

    #[test]
    fn dry_run_logs_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let mut log = TransactionLog::begin(Path::new("/src"), "{name}{ext}", true);
        log.complete();
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        assert!(matches!(rollback(&path), Err(RollbackError::DryRun)));
    }

    #[test]
    fn in_progress_logs_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let log = TransactionLog::begin(Path::new("/src"), "{name}{ext}", false);
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        assert!(matches!(
            rollback(&path),
            Err(RollbackError::NotCompleted(TransactionStatus::InProgress))
        ));
    }

    #[test]
    fn empty_completed_log_rolls_back_cleanly() {
        let temp = tempdir().expect("tempdir");
        let log = completed_log();
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert!(result.success);
        assert_eq!(result.files_restored, 0);
        assert_eq!(result.files_failed, 0);
        assert_eq!(result.directories_removed, 0);

        let reloaded = TransactionLog::load(&path).expect("load");
        assert_eq!(reloaded.status, TransactionStatus::RolledBack);
    }

    #[test]
    fn rolled_back_log_cannot_roll_back_twice() {
        let temp = tempdir().expect("tempdir");
        let log = completed_log();
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");
        rollback(&path).expect("first rollback");

        assert!(matches!(
            rollback(&path),
            Err(RollbackError::NotCompleted(TransactionStatus::RolledBack))
        ));
    }

    #[test]
    fn copy_is_undone_by_deleting_matching_destination() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("src/a.jpg");
        let dest = temp.path().join("dest/a.jpg");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&source, b"bytes").unwrap();
        fs::write(&dest, b"bytes").unwrap();

        let mut log = completed_log();
        log.operations
            .push(entry(&source, &dest, OperationKind::Copy, 5, None));
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert!(result.success);
        assert_eq!(result.files_restored, 1);
        assert!(!dest.exists());
        assert!(source.exists());
    }

    #[test]
    fn copy_with_mutated_destination_is_left_in_place() {
        let temp = tempdir().expect("tempdir");
        let dest = temp.path().join("dest/a.jpg");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"externally changed content").unwrap();

        let mut log = completed_log();
        log.operations.push(entry(
            Path::new("/src/a.jpg"),
            &dest,
            OperationKind::Copy,
            5,
            None,
        ));
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert!(!result.success);
        assert_eq!(result.files_failed, 1);
        assert!(dest.exists(), "mismatched file must not be deleted");
        assert_eq!(result.errors.len(), 1);

        let reloaded = TransactionLog::load(&path).expect("load");
        assert_eq!(reloaded.status, TransactionStatus::RolledBack);
    }

    #[test]
    fn copy_with_checksum_mismatch_is_left_in_place() {
        let temp = tempdir().expect("tempdir");
        let dest = temp.path().join("dest/a.jpg");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"bytes").unwrap();

        let mut log = completed_log();
        log.operations.push(entry(
            Path::new("/src/a.jpg"),
            &dest,
            OperationKind::Copy,
            5,
            Some("0".repeat(64)),
        ));
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert_eq!(result.files_failed, 1);
        assert!(dest.exists());
    }

    #[test]
    fn move_is_undone_by_moving_back() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("src/day1/a.jpg");
        let dest = temp.path().join("dest/a.jpg");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"bytes").unwrap();
        // The source directory is gone entirely; rollback recreates it.

        let mut log = completed_log();
        log.operations
            .push(entry(&source, &dest, OperationKind::Move, 5, None));
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert!(result.success);
        assert!(source.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn missing_moved_file_is_reported_and_continues() {
        let temp = tempdir().expect("tempdir");
        let source_a = temp.path().join("src/a.jpg");
        let dest_a = temp.path().join("dest/a.jpg");
        let source_b = temp.path().join("src/b.jpg");
        let dest_b = temp.path().join("dest/b.jpg");
        fs::create_dir_all(dest_b.parent().unwrap()).unwrap();
        fs::write(&dest_b, b"bytes").unwrap();

        let mut log = completed_log();
        log.operations
            .push(entry(&source_a, &dest_a, OperationKind::Move, 5, None));
        log.operations
            .push(entry(&source_b, &dest_b, OperationKind::Move, 5, None));
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert_eq!(result.files_restored, 1);
        assert_eq!(result.files_failed, 1);
        assert!(source_b.exists());
    }

    #[test]
    fn created_directories_are_removed_in_reverse_when_empty() {
        let temp = tempdir().expect("tempdir");
        let year = temp.path().join("dest/2024");
        let month = year.join("04");
        fs::create_dir_all(&month).unwrap();
        let kept = temp.path().join("dest/keep");
        fs::create_dir_all(&kept).unwrap();
        fs::write(kept.join("file.txt"), b"still here").unwrap();

        let mut log = completed_log();
        log.created_directories.push(year.clone());
        log.created_directories.push(month.clone());
        log.created_directories.push(kept.clone());
        let path = temp.path().join("log.json");
        log.save_to(&path).expect("save");

        let result = rollback(&path).expect("rollback");
        assert_eq!(result.directories_removed, 2);
        assert!(!month.exists());
        assert!(!year.exists());
        assert!(kept.exists(), "non-empty directories stay");
    }
}
