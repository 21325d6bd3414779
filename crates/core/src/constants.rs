pub const DEFAULT_TEMPLATE: &str = "{year}/{month}/{name}{ext}";

pub const DEFAULT_DUPLICATES_FORMAT: &str = "_{number}";

pub const LOG_DIR_NAME: &str = ".photocopy-logs";

pub const LOG_FILE_PREFIX: &str = "photocopy-";

/// Sidecar extension appended to the gazetteer path for the binary index.
pub const GEO_INDEX_SUFFIX: &str = "geostreamindex";

pub const CHECKSUM_BUFFER_SIZE: usize = 64 * 1024;

/// Extensions treated as organizable media when the user supplies no set.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "tif", "tiff", "webp", "dng", "raf", "cr2", "cr3",
    "arw", "nef", "orf", "rw2", "mp4", "mov", "avi", "m4v", "mts", "3gp",
];
