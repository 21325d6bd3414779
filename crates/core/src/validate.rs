use crate::record::FileRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Why a record was excluded from the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    MinDateValidator,
    MaxDateValidator,
    ExtensionValidator,
    AlreadyExists,
    ContentDuplicate,
    ScanError(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MinDateValidator => write!(f, "MinDateValidator"),
            SkipReason::MaxDateValidator => write!(f, "MaxDateValidator"),
            SkipReason::ExtensionValidator => write!(f, "ExtensionValidator"),
            SkipReason::AlreadyExists => write!(f, "AlreadyExists"),
            SkipReason::ContentDuplicate => write!(f, "ContentDuplicate"),
            SkipReason::ScanError(msg) => write!(f, "ScanError: {}", msg),
        }
    }
}

/// A predicate over an enriched record. Validators return values, never
/// errors; the first failing validator's reason lands in the plan's
/// skipped list.
#[derive(Debug, Clone)]
pub enum Validator {
    MinDate(NaiveDate),
    MaxDate(NaiveDate),
    AllowedExtensions(HashSet<String>),
}

impl Validator {
    pub fn check(&self, record: &FileRecord) -> Result<(), SkipReason> {
        match self {
            Validator::MinDate(min) => {
                let date = record.effective_date().map(|d| d.date_naive());
                match date {
                    Some(date) if date < *min => Err(SkipReason::MinDateValidator),
                    _ => Ok(()),
                }
            }
            // Inclusive end-of-day: any capture on the boundary date passes.
            Validator::MaxDate(max) => {
                let date = record.effective_date().map(|d| d.date_naive());
                match date {
                    Some(date) if date > *max => Err(SkipReason::MaxDateValidator),
                    _ => Ok(()),
                }
            }
            Validator::AllowedExtensions(allowed) => {
                let ext = record
                    .source_path
                    .extension()
                    .map(|v| v.to_string_lossy().to_ascii_lowercase())
                    .unwrap_or_default();
                if allowed.contains(&ext) {
                    Ok(())
                } else {
                    Err(SkipReason::ExtensionValidator)
                }
            }
        }
    }
}

/// Builds the fixed validator chain for a run. Order matters: the first
/// failure is the one reported.
pub fn build_validators(
    allowed_extensions: &HashSet<String>,
    min_date: Option<NaiveDate>,
    max_date: Option<NaiveDate>,
) -> Vec<Validator> {
    let mut validators = vec![Validator::AllowedExtensions(allowed_extensions.clone())];
    if let Some(min) = min_date {
        validators.push(Validator::MinDate(min));
    }
    if let Some(max) = max_date {
        validators.push(Validator::MaxDate(max));
    }
    validators
}

pub fn check_all(validators: &[Validator], record: &FileRecord) -> Result<(), SkipReason> {
    for validator in validators {
        validator.check(record)?;
    }
    Ok(())
}
