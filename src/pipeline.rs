//! Run coordinator: discovery → parse → normalize → batch → apply.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::batch::BatchAccumulator;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::files;
use crate::normalize::normalize_record;
use crate::util::db::Db;

/// Externally observable result of one run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RunSummary {
    pub files_found: usize,
    pub files_loaded: usize,
    pub files_malformed: usize,
    pub products_attempted: u64,
    pub products_upserted: u64,
    pub images_upserted: u64,
    pub records_malformed: u64,
}

/// Sequence the full run. Files are consumed in discovery order and
/// records flow through one shared accumulator, so a batch may mix the
/// tail of one file with the head of the next. Malformed files and
/// records are skipped and counted; a batch failure aborts the run
/// (batches committed earlier stay committed).
pub async fn run(db: &Db, config: &IngestConfig) -> Result<RunSummary, IngestError> {
    let paths = files::discover(&config.data_path)?;
    let mut summary = RunSummary {
        files_found: paths.len(),
        ..Default::default()
    };
    info!(
        files = paths.len(),
        path = %config.data_path.display(),
        "input files discovered"
    );

    let mut acc = BatchAccumulator::new(config.batch_size);

    for path in &paths {
        let file = files::display_name(path);
        let (records, file_error) = files::read_records(path);
        match &file_error {
            Some(err) => {
                warn!(
                    file = %err.file,
                    line = err.line,
                    column = err.column,
                    "skipping malformed file: {}",
                    err.message
                );
                summary.files_malformed += 1;
            }
            None => summary.files_loaded += 1,
        }

        let mut rejected = 0u64;
        for raw in &records {
            summary.products_attempted += 1;
            match normalize_record(raw, &file, Utc::now()) {
                Ok(row) => {
                    if let Some(batch) = acc.push(row) {
                        let outcome = db.apply_batch(&batch, config.normalize_images).await?;
                        summary.products_upserted += outcome.products;
                        summary.images_upserted += outcome.images;
                    }
                }
                Err(err) => {
                    debug!(file = %err.file, "skipping record: {}", err.reason);
                    rejected += 1;
                }
            }
        }
        if rejected > 0 {
            warn!(file = %file, skipped = rejected, "records failed validation");
            summary.records_malformed += rejected;
        }
        info!(file = %file, records = records.len(), "file processed");
    }

    if let Some(batch) = acc.finish() {
        let outcome = db.apply_batch(&batch, config.normalize_images).await?;
        summary.products_upserted += outcome.products;
        summary.images_upserted += outcome.images;
    }

    info!(
        files_found = summary.files_found,
        files_loaded = summary.files_loaded,
        files_malformed = summary.files_malformed,
        products_attempted = summary.products_attempted,
        products_upserted = summary.products_upserted,
        images_upserted = summary.images_upserted,
        records_malformed = summary.records_malformed,
        "run complete"
    );
    Ok(summary)
}
