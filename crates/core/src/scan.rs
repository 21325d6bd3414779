use crate::cancel::CancellationToken;
use crate::config::RelatedFileMode;
use crate::record::RelatedFile;
use anyhow::Result;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file as discovered on disk, before enrichment. Related siblings are
/// already attached so they travel with their primary from here on.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub related: Vec<RelatedFile>,
}

/// A file the scanner could not stat. Recorded and skipped; enumeration
/// continues.
#[derive(Debug, Clone)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub failures: Vec<ScanFailure>,
}

/// Recursively enumerates `root` depth-first without following symlinks.
/// Hidden files and directories are skipped. Ordering is stable for a
/// given tree: directory entries are visited in file-name order.
pub fn scan_directory(
    root: &Path,
    mode: RelatedFileMode,
    allowed_extensions: &HashSet<String>,
    cancel: &CancellationToken,
) -> Result<ScanOutcome> {
    let mut by_directory: HashMap<PathBuf, Vec<RawEntry>> = HashMap::new();
    let mut directory_order: Vec<PathBuf> = Vec::new();
    let mut failures = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    while let Some(entry) = walker.next() {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                tracing::warn!("scan error at {}: {err}", path.display());
                failures.push(ScanFailure {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_dir() {
            if entry.depth() > 0 && is_hidden(path) {
                walker.skip_current_dir();
            }
            continue;
        }
        if entry.path_is_symlink() || !entry.file_type().is_file() {
            continue;
        }
        if is_hidden(path) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!("could not stat {}: {err}", path.display());
                failures.push(ScanFailure {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
                continue;
            }
        };

        let directory = path.parent().unwrap_or(root).to_path_buf();
        let bucket = match by_directory.get_mut(&directory) {
            Some(bucket) => bucket,
            None => {
                directory_order.push(directory.clone());
                by_directory.entry(directory).or_default()
            }
        };
        bucket.push(RawEntry {
            path: path.to_path_buf(),
            size: metadata.len(),
            created: metadata.created().ok().map(DateTime::from),
            modified: metadata.modified().ok().map(DateTime::from),
        });
    }

    let mut files = Vec::new();
    for directory in directory_order {
        let entries = by_directory.remove(&directory).unwrap_or_default();
        files.extend(group_directory(entries, mode, allowed_extensions));
    }

    Ok(ScanOutcome { files, failures })
}

#[derive(Debug, Clone)]
struct RawEntry {
    path: PathBuf,
    size: u64,
    created: Option<DateTime<Local>>,
    modified: Option<DateTime<Local>>,
}

impl RawEntry {
    fn into_scanned(self, related: Vec<RelatedFile>) -> ScannedFile {
        ScannedFile {
            path: self.path,
            size: self.size,
            created: self.created,
            modified: self.modified,
            related,
        }
    }

    fn has_allowed_extension(&self, allowed: &HashSet<String>) -> bool {
        self.path
            .extension()
            .map(|ext| allowed.contains(&ext.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// Groups the files of one directory. Files in different directories are
/// never grouped, even when their names match.
fn group_directory(
    entries: Vec<RawEntry>,
    mode: RelatedFileMode,
    allowed_extensions: &HashSet<String>,
) -> Vec<ScannedFile> {
    if matches!(mode, RelatedFileMode::None) {
        return entries
            .into_iter()
            .map(|entry| entry.into_scanned(Vec::new()))
            .collect();
    }

    // Bucket by normalized stem, remembering discovery order of buckets.
    let mut bucket_keys: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<RawEntry>> = HashMap::new();
    for entry in entries {
        let key = base_key(&entry.path);
        if !buckets.contains_key(&key) {
            bucket_keys.push(key.clone());
        }
        buckets.entry(key).or_default().push(entry);
    }

    // Attach suffixed buckets to their base bucket: `<base>_<suffix>` in
    // Strict mode, any extension of the stem in Loose mode. The longest
    // matching base wins so chains collapse stepwise.
    let merge_target: HashMap<String, String> = bucket_keys
        .iter()
        .filter_map(|key| find_merge_base(key, &bucket_keys, mode).map(|base| (key.clone(), base)))
        .collect();

    let mut merged: HashMap<String, Vec<RawEntry>> = HashMap::new();
    let mut merged_order: Vec<String> = Vec::new();
    for key in &bucket_keys {
        let root_key = resolve_root(key, &merge_target);
        let members = buckets.remove(key).unwrap_or_default();
        if !merged.contains_key(&root_key) {
            merged_order.push(root_key.clone());
        }
        merged.entry(root_key).or_default().extend(members);
    }

    let mut out = Vec::new();
    for key in merged_order {
        let members = merged.remove(&key).unwrap_or_default();
        out.extend(split_group(members, allowed_extensions));
    }
    out
}

/// Chooses the primary (first member with an allowed extension) and turns
/// the rest into its related files. A group with no eligible member
/// degrades to one primary per file so each can be reported individually.
fn split_group(members: Vec<RawEntry>, allowed_extensions: &HashSet<String>) -> Vec<ScannedFile> {
    let primary_index = members
        .iter()
        .position(|member| member.has_allowed_extension(allowed_extensions));

    let Some(primary_index) = primary_index else {
        return members
            .into_iter()
            .map(|member| member.into_scanned(Vec::new()))
            .collect();
    };

    let mut related = Vec::new();
    let mut primary = None;
    for (index, member) in members.into_iter().enumerate() {
        if index == primary_index {
            primary = Some(member);
        } else {
            related.push(RelatedFile {
                source_path: member.path,
                size: member.size,
            });
        }
    }
    let primary = primary.expect("primary index points into members");
    vec![primary.into_scanned(related)]
}

/// Case-insensitive stem used as the group key. XMP sidecars named
/// `name.ext.xmp` strip both extensions so they land next to `name.ext`.
fn base_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();

    let is_xmp = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("xmp"))
        .unwrap_or(false);
    let stem = if is_xmp {
        Path::new(&stem)
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or(stem)
    } else {
        stem
    };

    stem.to_ascii_lowercase()
}

fn find_merge_base(key: &str, keys: &[String], mode: RelatedFileMode) -> Option<String> {
    let mut best: Option<&String> = None;
    for candidate in keys {
        if candidate == key || candidate.len() >= key.len() {
            continue;
        }
        let extends = match mode {
            RelatedFileMode::Strict => {
                key.starts_with(candidate) && key.as_bytes().get(candidate.len()) == Some(&b'_')
            }
            RelatedFileMode::Loose => key.starts_with(candidate.as_str()),
            RelatedFileMode::None => false,
        };
        if extends && best.map(|b| candidate.len() > b.len()).unwrap_or(true) {
            best = Some(candidate);
        }
    }
    best.cloned()
}

fn resolve_root(key: &str, merge_target: &HashMap<String, String>) -> String {
    let mut current = key.to_string();
    // Bounded: each hop strictly shortens the key.
    while let Some(parent) = merge_target.get(&current) {
        current = parent.clone();
    }
    current
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_extension_set;
    use std::fs;
    use tempfile::tempdir;

    fn scan(root: &Path, mode: RelatedFileMode) -> ScanOutcome {
        scan_directory(
            root,
            mode,
            &default_extension_set(),
            &CancellationToken::new(),
        )
        .expect("scan should succeed")
    }

    fn names(outcome: &ScanOutcome) -> Vec<String> {
        outcome
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn none_mode_yields_one_primary_per_file() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.jpg"), b"a").unwrap();
        fs::write(temp.path().join("a.dng"), b"raw").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::None);
        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.files.iter().all(|f| f.related.is_empty()));
    }

    #[test]
    fn strict_mode_groups_raw_and_sidecars() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("IMG_0001.JPG"), b"jpeg").unwrap();
        fs::write(temp.path().join("IMG_0001.dng"), b"raw").unwrap();
        fs::write(temp.path().join("IMG_0001.JPG.xmp"), b"xml").unwrap();
        fs::write(temp.path().join("other.jpg"), b"x").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::Strict);
        assert_eq!(outcome.files.len(), 2);

        let group = outcome
            .files
            .iter()
            .find(|f| f.path.file_name().unwrap() == "IMG_0001.JPG")
            .expect("the JPG sorts first among allowed members, so it is the primary");
        assert_eq!(group.related.len(), 2);
        let related: Vec<_> = group
            .related
            .iter()
            .map(|r| r.source_path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(related.contains(&"IMG_0001.dng".to_string()));
        assert!(related.contains(&"IMG_0001.JPG.xmp".to_string()));
    }

    #[test]
    fn strict_mode_groups_suffixed_names() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("pic.jpg"), b"x").unwrap();
        fs::write(temp.path().join("pic_edited.jpg"), b"y").unwrap();
        fs::write(temp.path().join("picture.jpg"), b"z").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::Strict);
        // picture does not match pic_<suffix>, so it stays separate.
        assert_eq!(outcome.files.len(), 2);
        let primary = outcome
            .files
            .iter()
            .find(|f| f.path.file_name().unwrap() == "pic.jpg")
            .expect("pic.jpg is primary");
        assert_eq!(primary.related.len(), 1);
    }

    #[test]
    fn loose_mode_groups_prefix_names() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("pic.jpg"), b"x").unwrap();
        fs::write(temp.path().join("picture.jpg"), b"z").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::Loose);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].related.len(), 1);
    }

    #[test]
    fn files_in_different_directories_never_group() {
        let temp = tempdir().expect("tempdir");
        let day1 = temp.path().join("day1");
        let day2 = temp.path().join("day2");
        fs::create_dir_all(&day1).unwrap();
        fs::create_dir_all(&day2).unwrap();
        fs::write(day1.join("IMG_1.jpg"), b"a").unwrap();
        fs::write(day2.join("IMG_1.dng"), b"b").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::Strict);
        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.files.iter().all(|f| f.related.is_empty()));
    }

    #[test]
    fn grouping_is_case_insensitive() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("IMG_0001.jpg"), b"a").unwrap();
        fs::write(temp.path().join("img_0001.RAF"), b"b").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::Strict);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].related.len(), 1);
    }

    #[test]
    fn hidden_entries_are_skipped() {
        let temp = tempdir().expect("tempdir");
        let hidden_dir = temp.path().join(".cache");
        fs::create_dir_all(&hidden_dir).unwrap();
        fs::write(hidden_dir.join("inside.jpg"), b"x").unwrap();
        fs::write(temp.path().join(".hidden.jpg"), b"y").unwrap();
        fs::write(temp.path().join("visible.jpg"), b"z").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::None);
        assert_eq!(names(&outcome), vec!["visible.jpg"]);
    }

    #[test]
    fn scan_order_is_stable() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("b.jpg"), b"b").unwrap();
        fs::write(temp.path().join("a.jpg"), b"a").unwrap();
        fs::write(temp.path().join("c.jpg"), b"c").unwrap();

        let first = names(&scan(temp.path(), RelatedFileMode::None));
        let second = names(&scan(temp.path(), RelatedFileMode::None));
        assert_eq!(first, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(first, second);
    }

    #[test]
    fn ungroupable_extensions_become_their_own_primaries() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("notes.txt"), b"a").unwrap();
        fs::write(temp.path().join("notes.md"), b"b").unwrap();

        let outcome = scan(temp.path(), RelatedFileMode::Strict);
        // Neither member is organizable, so both surface individually for
        // the extension validator to report.
        assert_eq!(outcome.files.len(), 2);
    }

    #[test]
    fn cancellation_aborts_the_walk() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.jpg"), b"a").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = scan_directory(
            temp.path(),
            RelatedFileMode::None,
            &default_extension_set(),
            &token,
        );
        assert!(result.is_err());
    }
}
