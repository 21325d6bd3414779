use crate::config::RunConfig;
use crate::record::FileRecord;
use crate::sanitize::sanitize_segment;
use crate::template::{parse_template, render_template, TemplateError, TemplatePart};
use crate::validate::SkipReason;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Outcome of resolving one record against the destination tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Target(PathBuf),
    Skip(SkipReason),
}

/// Turns an enriched record into a concrete destination path. Purely
/// deterministic for a fixed record, template, plan state, and disk state;
/// performs read-only existence checks but never writes.
pub struct PathResolver {
    parts: Vec<TemplatePart>,
    destination_root: PathBuf,
    duplicates_format: String,
    skip_existing: bool,
    overwrite: bool,
}

impl PathResolver {
    pub fn new(config: &RunConfig) -> Result<Self, TemplateError> {
        Ok(Self {
            parts: parse_template(&config.template)?,
            destination_root: config.destination.clone(),
            duplicates_format: config.duplicates_format.clone(),
            skip_existing: config.skip_existing,
            overwrite: config.overwrite,
        })
    }

    /// Resolves the record's destination. `planned` holds destinations
    /// already claimed by earlier operations in this plan; those always
    /// collide, whatever the overwrite setting, so a plan never targets
    /// one path twice.
    pub fn resolve(&self, record: &FileRecord, planned: &HashSet<PathBuf>) -> Resolution {
        let candidate = self.render_destination(record);

        if self.skip_existing && candidate.exists() && !planned.contains(&candidate) {
            return Resolution::Skip(SkipReason::AlreadyExists);
        }
        if !self.collides(&candidate, planned) {
            return Resolution::Target(candidate);
        }

        let parent = candidate
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.destination_root.clone());
        let stem = candidate
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let ext = candidate
            .extension()
            .map(|v| format!(".{}", v.to_string_lossy()))
            .unwrap_or_default();

        // Smallest suffix number wins, counting both on-disk files and
        // destinations already planned.
        let mut n = 1u64;
        loop {
            let suffix = self.duplicates_format.replace("{number}", &n.to_string());
            let numbered = parent.join(format!("{stem}{suffix}{ext}"));
            if !self.collides(&numbered, planned) {
                return Resolution::Target(numbered);
            }
            n += 1;
        }
    }

    /// Renders the template and joins the sanitized segments under the
    /// destination root with native separators.
    fn render_destination(&self, record: &FileRecord) -> PathBuf {
        let rendered = render_template(&self.parts, record);
        let mut path = self.destination_root.clone();
        for segment in rendered.split(['/', '\\']) {
            if segment.is_empty() {
                continue;
            }
            path.push(sanitize_segment(segment));
        }
        path
    }

    fn collides(&self, candidate: &Path, planned: &HashSet<PathBuf>) -> bool {
        if planned.contains(candidate) {
            return true;
        }
        !self.overwrite && candidate.exists()
    }
}
