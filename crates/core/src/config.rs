use crate::constants::{DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_DUPLICATES_FORMAT, DEFAULT_TEMPLATE};
use crate::planner::OperationKind;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// What to do when a record's content fingerprint was already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateHandling {
    None,
    SkipDuplicates,
    RenameNumbered,
}

/// How sibling files are grouped under a primary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelatedFileMode {
    None,
    Strict,
    Loose,
}

/// The complete configuration of one run. Built once by the caller and
/// passed by reference through every stage; never mutated after that.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: OperationKind,
    pub template: String,
    pub dry_run: bool,
    pub enable_rollback: bool,
    pub calculate_checksums: bool,
    pub duplicate_handling: DuplicateHandling,
    pub duplicates_format: String,
    pub allowed_extensions: HashSet<String>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub skip_existing: bool,
    pub overwrite: bool,
    pub related_file_mode: RelatedFileMode,
    pub gazetteer_path: Option<PathBuf>,
    pub minimum_population: u64,
    pub parallelism: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            mode: OperationKind::Copy,
            template: DEFAULT_TEMPLATE.to_string(),
            dry_run: false,
            enable_rollback: true,
            calculate_checksums: false,
            duplicate_handling: DuplicateHandling::None,
            duplicates_format: DEFAULT_DUPLICATES_FORMAT.to_string(),
            allowed_extensions: default_extension_set(),
            min_date: None,
            max_date: None,
            skip_existing: false,
            overwrite: false,
            related_file_mode: RelatedFileMode::None,
            gazetteer_path: None,
            minimum_population: 0,
            parallelism: 1,
        }
    }
}

pub fn default_extension_set() -> HashSet<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Persisted defaults the CLI layers under its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub template: String,
    pub duplicates_format: String,
    pub allowed_extensions: Vec<String>,
    pub gazetteer_path: Option<PathBuf>,
    pub minimum_population: u64,
    pub calculate_checksums: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            duplicates_format: DEFAULT_DUPLICATES_FORMAT.to_string(),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            gazetteer_path: None,
            minimum_population: 0,
            calculate_checksums: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "photocopy", "photocopy")
        .context("could not resolve the OS config directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    if !paths.config_path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(&paths.config_path)
        .with_context(|| format!("failed to read config file: {}", paths.config_path.display()))?;

    let config = toml::from_str::<AppConfig>(&raw).context("failed to parse config file")?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    let paths = app_paths()?;
    fs::create_dir_all(&paths.config_dir).with_context(|| {
        format!(
            "failed to create config directory: {}",
            paths.config_dir.display()
        )
    })?;
    let body = toml::to_string_pretty(config).context("failed to serialize config")?;
    fs::write(&paths.config_path, body)
        .with_context(|| format!("failed to write config file: {}", paths.config_path.display()))?;
    Ok(())
}
