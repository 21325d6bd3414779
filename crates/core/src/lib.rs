mod cancel;
mod checksum;
mod config;
mod constants;
mod dedupe;
mod enrich;
mod executor;
mod exif_reader;
mod gazetteer;
mod geocode;
mod planner;
mod progress;
mod record;
mod resolver;
mod rollback;
mod sanitize;
mod scan;
mod template;
mod transaction;
mod validate;

pub use cancel::CancellationToken;
pub use checksum::checksum_file;
pub use config::{
    app_paths, default_extension_set, load_config, save_config, AppConfig, AppPaths,
    DuplicateHandling, RelatedFileMode, RunConfig,
};
pub use constants::{
    DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_DUPLICATES_FORMAT, DEFAULT_TEMPLATE, LOG_DIR_NAME,
    LOG_FILE_PREFIX,
};
pub use dedupe::{DuplicateEntry, DuplicateIndex};
pub use enrich::{EnrichmentPipeline, EnrichmentStep};
pub use executor::{execute_plan, CopyError, RunResult};
pub use exif_reader::{read_image_metadata, ImageMetadata};
pub use gazetteer::{Place, sidecar_path};
pub use geocode::Geocoder;
pub use planner::{
    generate_plan, Operation, OperationKind, Plan, RelatedTransfer, SkippedFile,
};
pub use progress::{NullReporter, Progress, ProgressReporter};
pub use record::{FileRecord, GpsCoordinates, LocationData, RelatedFile};
pub use rollback::{rollback, RollbackError, RollbackResult};
pub use scan::{scan_directory, ScanFailure, ScanOutcome, ScannedFile};
pub use template::{parse_template, render_template, validate_template, TemplateError, TemplatePart};
pub use transaction::{LoggedOperation, TransactionLog, TransactionStatus};
pub use validate::{build_validators, check_all, SkipReason, Validator};
