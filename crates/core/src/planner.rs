use crate::cancel::CancellationToken;
use crate::config::{DuplicateHandling, RunConfig};
use crate::dedupe::DuplicateIndex;
use crate::enrich::EnrichmentPipeline;
use crate::geocode::Geocoder;
use crate::record::FileRecord;
use crate::resolver::{PathResolver, Resolution};
use crate::scan::scan_directory;
use crate::validate::{build_validators, check_all, SkipReason};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Copy,
    Move,
}

/// A sibling transfer carried by a primary operation. Related files land
/// in the primary's destination directory under their original basename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedTransfer {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub size: u64,
}

/// One planned unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub kind: OperationKind,
    pub size: u64,
    pub checksum: Option<String>,
    pub related: Vec<RelatedTransfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub source_path: PathBuf,
    pub reason: SkipReason,
}

/// The immutable result of planning. Directories are listed in creation
/// order: every parent appears before any of its children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub operations: Vec<Operation>,
    pub directories: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    pub total_bytes: u64,
}

/// Streams the source tree through scan → enrich → validate → dedupe →
/// resolve and accumulates a plan. Read-only with respect to the
/// filesystem: existence checks only, never a write.
pub fn generate_plan(
    config: &RunConfig,
    geocoder: &Geocoder,
    cancel: &CancellationToken,
) -> Result<Plan> {
    if !config.source.exists() {
        anyhow::bail!("source directory does not exist: {}", config.source.display());
    }
    if !config.source.is_dir() {
        anyhow::bail!("source is not a directory: {}", config.source.display());
    }

    let resolver = PathResolver::new(config)
        .with_context(|| format!("invalid destination template: {}", config.template))?;
    let validators = build_validators(&config.allowed_extensions, config.min_date, config.max_date);

    let outcome = scan_directory(
        &config.source,
        config.related_file_mode,
        &config.allowed_extensions,
        cancel,
    )?;

    let pipeline = EnrichmentPipeline::for_run(config, geocoder);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelism.max(1))
        .build()
        .context("failed to build worker pool")?;
    // Collection preserves discovery order, so the plan is deterministic
    // for a given tree regardless of worker count.
    let records = pool.install(|| pipeline.enrich_all(outcome.files, cancel))?;

    let duplicates = DuplicateIndex::new();
    let mut plan = Plan::default();
    let mut planned_paths = HashSet::<PathBuf>::new();
    let mut seen_directories = HashSet::<PathBuf>::new();

    for failure in outcome.failures {
        plan.skipped.push(SkippedFile {
            source_path: failure.path,
            reason: SkipReason::ScanError(failure.message),
        });
    }

    for record in records {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }

        if let Err(reason) = check_all(&validators, &record) {
            plan.skipped.push(SkippedFile {
                source_path: record.source_path,
                reason,
            });
            continue;
        }

        if let Some(reason) = check_duplicate(config, &duplicates, &record) {
            plan.skipped.push(SkippedFile {
                source_path: record.source_path,
                reason,
            });
            continue;
        }

        let destination = match resolver.resolve(&record, &planned_paths) {
            Resolution::Target(path) => path,
            Resolution::Skip(reason) => {
                plan.skipped.push(SkippedFile {
                    source_path: record.source_path,
                    reason,
                });
                continue;
            }
        };

        planned_paths.insert(destination.clone());
        push_directories(
            &mut plan.directories,
            &mut seen_directories,
            &config.destination,
            &destination,
        );

        plan.total_bytes += record.size;
        plan.operations
            .push(build_operation(config.mode, record, destination));
    }

    Ok(plan)
}

/// Consults the duplicate index ahead of path resolution. First
/// registration wins; later records with the same fingerprint become
/// skips unless the run asks for numbered copies.
fn check_duplicate(
    config: &RunConfig,
    duplicates: &DuplicateIndex,
    record: &FileRecord,
) -> Option<SkipReason> {
    if matches!(config.duplicate_handling, DuplicateHandling::None) {
        return None;
    }
    let existing = duplicates.register(record)?;
    match config.duplicate_handling {
        DuplicateHandling::SkipDuplicates => {
            tracing::debug!(
                "content duplicate: {} matches {}",
                record.source_path.display(),
                existing.source_path.display()
            );
            Some(SkipReason::ContentDuplicate)
        }
        DuplicateHandling::RenameNumbered | DuplicateHandling::None => None,
    }
}

fn build_operation(kind: OperationKind, record: FileRecord, destination: PathBuf) -> Operation {
    let destination_dir = destination
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| destination.clone());
    let related = record
        .related
        .iter()
        .map(|related| {
            let basename = related
                .source_path
                .file_name()
                .map(|v| v.to_os_string())
                .unwrap_or_default();
            RelatedTransfer {
                source_path: related.source_path.clone(),
                destination_path: destination_dir.join(basename),
                size: related.size,
            }
        })
        .collect();

    Operation {
        source_path: record.source_path,
        destination_path: destination,
        kind,
        size: record.size,
        checksum: record.checksum,
        related,
    }
}

/// Appends every missing ancestor of `destination` (from the destination
/// root downwards) so parents always precede children.
fn push_directories(
    directories: &mut Vec<PathBuf>,
    seen: &mut HashSet<PathBuf>,
    destination_root: &Path,
    destination: &Path,
) {
    let Some(parent) = destination.parent() else {
        return;
    };

    let mut chain = Vec::new();
    let mut current = parent;
    loop {
        chain.push(current.to_path_buf());
        if current == destination_root {
            break;
        }
        match current.parent() {
            Some(next) if current.starts_with(destination_root) => current = next,
            _ => break,
        }
    }

    for dir in chain.into_iter().rev() {
        if seen.insert(dir.clone()) {
            directories.push(dir);
        }
    }
}
