use crate::constants::{LOG_DIR_NAME, LOG_FILE_PREFIX};
use crate::planner::OperationKind;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// One executed mutation. Entries are appended only after the filesystem
/// call has returned, so the log never claims work that did not happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedOperation {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub operation: OperationKind,
    pub file_size: u64,
    pub timestamp: DateTime<Utc>,
    pub checksum: Option<String>,
}

/// The persisted record of one run. Serialized as indented camelCase JSON
/// under `<destination>/.photocopy-logs/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLog {
    pub transaction_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub source_directory: PathBuf,
    pub destination_pattern: String,
    pub is_dry_run: bool,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub operations: Vec<LoggedOperation>,
    pub created_directories: Vec<PathBuf>,
}

impl TransactionLog {
    /// Opens a transaction. The id is time-prefixed so log files sort
    /// lexicographically by start instant.
    pub fn begin(source: &Path, destination_pattern: &str, is_dry_run: bool) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            start_time: Utc::now(),
            end_time: None,
            source_directory: source.to_path_buf(),
            destination_pattern: destination_pattern.to_string(),
            is_dry_run,
            status: TransactionStatus::InProgress,
            error_message: None,
            operations: Vec::new(),
            created_directories: Vec::new(),
        }
    }

    pub fn log_operation(&mut self, entry: LoggedOperation) {
        debug_assert_eq!(self.status, TransactionStatus::InProgress);
        self.operations.push(entry);
    }

    pub fn log_directory_created(&mut self, directory: PathBuf) {
        debug_assert_eq!(self.status, TransactionStatus::InProgress);
        self.created_directories.push(directory);
    }

    pub fn complete(&mut self) {
        if self.status != TransactionStatus::InProgress {
            tracing::warn!(
                "ignoring complete() on transaction {} in state {:?}",
                self.transaction_id,
                self.status
            );
            return;
        }
        self.status = TransactionStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status != TransactionStatus::InProgress {
            tracing::warn!(
                "ignoring fail() on transaction {} in state {:?}",
                self.transaction_id,
                self.status
            );
            return;
        }
        self.status = TransactionStatus::Failed;
        self.error_message = Some(message.into());
        self.end_time = Some(Utc::now());
    }

    /// Only a completed transaction can be rolled back; the rollback
    /// module validates that before calling this.
    pub fn mark_rolled_back(&mut self) {
        debug_assert_eq!(self.status, TransactionStatus::Completed);
        self.status = TransactionStatus::RolledBack;
    }

    pub fn log_path(destination_root: &Path, transaction_id: &str) -> PathBuf {
        destination_root
            .join(LOG_DIR_NAME)
            .join(format!("{LOG_FILE_PREFIX}{transaction_id}.json"))
    }

    /// Persists the full document under the destination root and returns
    /// the log path.
    pub fn save(&self, destination_root: &Path) -> Result<PathBuf> {
        let path = Self::log_path(destination_root, &self.transaction_id);
        self.save_to(&path)?;
        Ok(path)
    }

    /// Atomic write: temp file in the target directory, fsync, rename.
    /// A failed save never leaves a half-written log behind.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .with_context(|| format!("log path has no parent: {}", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory: {}", parent.display()))?;

        let body = serde_json::to_string_pretty(self).context("failed to serialize transaction log")?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp log in {}", parent.display()))?;
        temp.write_all(body.as_bytes())
            .with_context(|| format!("failed to write log: {}", path.display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync log: {}", path.display()))?;
        temp.persist(path)
            .with_context(|| format!("failed to persist log: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read transaction log: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("transaction log is corrupt: {}", path.display()))
    }
}

fn new_transaction_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{timestamp}-{}", &random[..8])
}
