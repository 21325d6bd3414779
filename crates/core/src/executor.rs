use crate::cancel::CancellationToken;
use crate::config::RunConfig;
use crate::planner::{Operation, OperationKind, Plan};
use crate::progress::{Progress, ProgressReporter};
use crate::transaction::{LoggedOperation, TransactionLog};
use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A per-file execution failure. The run continues past these; they are
/// collected into the run result.
#[derive(Debug, Clone, Serialize)]
pub struct CopyError {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub message: String,
}

/// Structured outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64,
    pub errors: Vec<CopyError>,
    pub dry_run: bool,
    pub transaction_id: Option<String>,
    pub log_path: Option<PathBuf>,
}

/// Shared mutation recorder. The mutex is the synchronization point that
/// keeps log append order equal to filesystem completion order, and
/// serializes directory creation between overlapping operations.
struct Recorder {
    log: Option<Mutex<TransactionLog>>,
    created: Mutex<HashSet<PathBuf>>,
}

impl Recorder {
    fn new(log: Option<TransactionLog>) -> Self {
        Self {
            log: log.map(Mutex::new),
            created: Mutex::new(HashSet::new()),
        }
    }

    /// Creates the directory if missing and logs it, but only when this
    /// run actually created it, never when it already existed.
    fn ensure_directory(&self, directory: &Path) -> io::Result<()> {
        let mut created = self.created.lock().expect("created set poisoned");
        if created.contains(directory) || directory.exists() {
            return Ok(());
        }
        fs::create_dir_all(directory)?;
        created.insert(directory.to_path_buf());
        if let Some(log) = &self.log {
            log.lock()
                .expect("transaction log poisoned")
                .log_directory_created(directory.to_path_buf());
        }
        Ok(())
    }

    fn log_operation(&self, entry: LoggedOperation) {
        if let Some(log) = &self.log {
            log.lock()
                .expect("transaction log poisoned")
                .log_operation(entry);
        }
    }

    fn into_log(self) -> Option<TransactionLog> {
        self.log
            .map(|mutex| mutex.into_inner().expect("transaction log poisoned"))
    }
}

/// Walks the plan and performs its operations. Per-file failures are
/// tolerated; only a failed log save aborts the run, because without a
/// durable log further mutations would be unrecoverable.
pub fn execute_plan(
    plan: &Plan,
    config: &RunConfig,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    if config.dry_run {
        // The executor never runs for a dry run; surface the plan's counts.
        return Ok(RunResult {
            processed: 0,
            failed: 0,
            skipped: plan.skipped.len(),
            total_bytes: 0,
            errors: Vec::new(),
            dry_run: true,
            transaction_id: None,
            log_path: None,
        });
    }

    let log = if config.enable_rollback {
        Some(TransactionLog::begin(
            &config.source,
            &config.template,
            false,
        ))
    } else {
        None
    };
    let transaction_id = log.as_ref().map(|l| l.transaction_id.clone());
    let recorder = Recorder::new(log);

    // Plan directories are parent-first; creating them up front keeps the
    // per-operation ensure cheap.
    for directory in &plan.directories {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(err) = recorder.ensure_directory(directory) {
            tracing::warn!("could not create {}: {err}", directory.display());
        }
    }

    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let bytes = AtomicU64::new(0);
    let errors = Mutex::new(Vec::<CopyError>::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelism.max(1))
        .build()
        .context("failed to build worker pool")?;

    pool.install(|| {
        plan.operations.par_iter().for_each(|operation| {
            if cancel.is_cancelled() {
                return;
            }
            match perform_operation(operation, config, &recorder, &errors) {
                Ok(transferred) => {
                    processed.fetch_add(1, Ordering::SeqCst);
                    bytes.fetch_add(transferred, Ordering::SeqCst);
                }
                Err(err) => {
                    failed.fetch_add(1, Ordering::SeqCst);
                    errors.lock().expect("errors poisoned").push(CopyError {
                        source_path: operation.source_path.clone(),
                        destination_path: operation.destination_path.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
            reporter.report(&Progress {
                processed: processed.load(Ordering::SeqCst),
                failed: failed.load(Ordering::SeqCst),
                skipped: plan.skipped.len(),
                bytes: bytes.load(Ordering::SeqCst),
            });
        });
    });

    let processed = processed.into_inner();
    let failed = failed.into_inner();
    let bytes = bytes.into_inner();
    let errors = errors.into_inner().expect("errors poisoned");

    let mut log_path = None;
    if let Some(mut log) = recorder.into_log() {
        if cancel.is_cancelled() {
            log.fail("cancelled");
        } else if processed == 0 && failed > 0 {
            log.fail("no operations succeeded");
        } else {
            log.complete();
        }
        let path = log
            .save(&config.destination)
            .context("failed to persist transaction log")?;
        log_path = Some(path);
    }

    let result = RunResult {
        processed,
        failed,
        skipped: plan.skipped.len(),
        total_bytes: bytes,
        errors,
        dry_run: false,
        transaction_id,
        log_path,
    };
    reporter.complete(&Progress {
        processed: result.processed,
        failed: result.failed,
        skipped: result.skipped,
        bytes: result.total_bytes,
    });

    if cancel.is_cancelled() {
        anyhow::bail!("cancelled");
    }
    Ok(result)
}

/// Transfers the primary file and then its related siblings. The log
/// entry for each transfer is appended strictly after the filesystem call
/// returns. Related failures are recorded without failing the primary.
fn perform_operation(
    operation: &Operation,
    config: &RunConfig,
    recorder: &Recorder,
    errors: &Mutex<Vec<CopyError>>,
) -> Result<u64> {
    if let Some(parent) = operation.destination_path.parent() {
        recorder
            .ensure_directory(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    transfer_file(
        &operation.source_path,
        &operation.destination_path,
        operation.kind,
        config.overwrite,
    )?;
    recorder.log_operation(LoggedOperation {
        source_path: operation.source_path.clone(),
        destination_path: operation.destination_path.clone(),
        operation: operation.kind,
        file_size: operation.size,
        timestamp: Utc::now(),
        checksum: operation.checksum.clone(),
    });

    for related in &operation.related {
        let outcome = transfer_file(
            &related.source_path,
            &related.destination_path,
            operation.kind,
            config.overwrite,
        );
        match outcome {
            Ok(()) => recorder.log_operation(LoggedOperation {
                source_path: related.source_path.clone(),
                destination_path: related.destination_path.clone(),
                operation: operation.kind,
                file_size: related.size,
                timestamp: Utc::now(),
                checksum: None,
            }),
            Err(err) => {
                tracing::warn!(
                    "related transfer failed {}: {err:#}",
                    related.source_path.display()
                );
                errors.lock().expect("errors poisoned").push(CopyError {
                    source_path: related.source_path.clone(),
                    destination_path: related.destination_path.clone(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    Ok(operation.size)
}

fn transfer_file(source: &Path, destination: &Path, kind: OperationKind, overwrite: bool) -> Result<()> {
    if destination.exists() && !overwrite {
        anyhow::bail!("destination already exists: {}", destination.display());
    }

    match kind {
        OperationKind::Copy => {
            fs::copy(source, destination).with_context(|| {
                format!(
                    "copy failed: {} -> {}",
                    source.display(),
                    destination.display()
                )
            })?;
        }
        OperationKind::Move => match fs::rename(source, destination) {
            Ok(()) => {}
            Err(err) if is_cross_device(&err) => {
                fs::copy(source, destination).with_context(|| {
                    format!(
                        "cross-device copy failed: {} -> {}",
                        source.display(),
                        destination.display()
                    )
                })?;
                fs::remove_file(source).with_context(|| {
                    format!("failed to remove moved source: {}", source.display())
                })?;
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "move failed: {} -> {}",
                        source.display(),
                        destination.display()
                    )
                });
            }
        },
    }
    Ok(())
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(not(unix))]
    {
        // ERROR_NOT_SAME_DEVICE on Windows.
        err.raw_os_error() == Some(17)
    }
}
