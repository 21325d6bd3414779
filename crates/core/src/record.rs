use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// WGS84 coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Resolved place for a set of coordinates. Each field is independently
/// optional; the whole struct is absent when no lookup succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub city: String,
    pub district: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub population: u64,
}

/// A sibling file carried along with its primary record. Related files are
/// grouped within a single directory only and never become primaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedFile {
    pub source_path: PathBuf,
    pub size: u64,
}

/// One enriched file. Built by the scanner and the enrichment pipeline,
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub source_path: PathBuf,
    pub size: u64,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub capture: Option<DateTime<Local>>,
    pub gps: Option<GpsCoordinates>,
    pub camera: Option<String>,
    pub checksum: Option<String>,
    pub location: Option<LocationData>,
    pub related: Vec<RelatedFile>,
}

impl FileRecord {
    /// Capture date with the filesystem fallbacks applied: capture time,
    /// then creation time, then modification time.
    pub fn effective_date(&self) -> Option<DateTime<Local>> {
        self.capture.or(self.created).or(self.modified)
    }

    pub fn file_stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    }

    /// Extension with its leading dot, original case preserved.
    pub fn extension_with_dot(&self) -> String {
        self.source_path
            .extension()
            .map(|v| format!(".{}", v.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn normalized_camera(&self) -> Option<&str> {
        self.camera.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
