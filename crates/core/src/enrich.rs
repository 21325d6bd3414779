use crate::cancel::CancellationToken;
use crate::checksum::checksum_file;
use crate::config::RunConfig;
use crate::exif_reader::read_image_metadata;
use crate::geocode::Geocoder;
use crate::record::FileRecord;
use crate::scan::ScannedFile;
use anyhow::Result;
use rayon::prelude::*;

/// One enrichment stage. The list is closed and applied in a fixed order;
/// a record flows through every step exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStep {
    DateTime,
    Location,
    Checksum,
}

/// Applies the configured steps to raw scanner output. Metadata failures
/// are never fatal: the affected fields stay `None` and the record
/// continues down the pipeline.
pub struct EnrichmentPipeline<'a> {
    steps: Vec<EnrichmentStep>,
    geocoder: &'a Geocoder,
}

impl<'a> EnrichmentPipeline<'a> {
    pub fn for_run(config: &RunConfig, geocoder: &'a Geocoder) -> Self {
        let mut steps = vec![EnrichmentStep::DateTime, EnrichmentStep::Location];
        if config.calculate_checksums {
            steps.push(EnrichmentStep::Checksum);
        }
        Self { steps, geocoder }
    }

    pub fn steps(&self) -> &[EnrichmentStep] {
        &self.steps
    }

    pub fn enrich(&self, file: ScannedFile) -> FileRecord {
        let mut record = FileRecord {
            source_path: file.path,
            size: file.size,
            created: file.created,
            modified: file.modified,
            capture: None,
            gps: None,
            camera: None,
            checksum: None,
            location: None,
            related: file.related,
        };

        for step in &self.steps {
            self.apply(*step, &mut record);
        }

        record
    }

    /// Enriches a batch on the current rayon pool, preserving input order.
    pub fn enrich_all(
        &self,
        files: Vec<ScannedFile>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileRecord>> {
        files
            .into_par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    anyhow::bail!("cancelled");
                }
                Ok(self.enrich(file))
            })
            .collect()
    }

    fn apply(&self, step: EnrichmentStep, record: &mut FileRecord) {
        match step {
            // One container parse serves the capture date; the GPS fix and
            // camera tag ride along so the file is read only once.
            EnrichmentStep::DateTime => {
                let metadata = read_image_metadata(&record.source_path);
                record.capture = metadata.capture;
                record.gps = metadata.gps;
                record.camera = metadata.camera;
            }
            EnrichmentStep::Location => {
                record.location = record
                    .gps
                    .and_then(|gps| self.geocoder.reverse_geocode(gps.latitude, gps.longitude));
            }
            EnrichmentStep::Checksum => match checksum_file(&record.source_path) {
                Ok(checksum) => record.checksum = Some(checksum),
                Err(err) => {
                    tracing::warn!(
                        "checksum failed for {}: {err:#}",
                        record.source_path.display()
                    );
                }
            },
        }
    }
}
