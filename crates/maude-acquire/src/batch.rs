use crate::fda::FdaClient;
use crate::{links, output};
use anyhow::{Context, Result};
use maude_model::{ExtractError, ExtractedRecord, ExtractionSummary, MdrId};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Default directory for output files.
pub const DEFAULT_OUTPUT_DIR: &str = "extracted_data";

/// Progress is logged every this many records (every record when verbose).
const PROGRESS_EVERY: usize = 10;

/// Anything that can look up one record by MDR identifier.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn fetch(&mut self, id: &MdrId) -> Option<Value>;

    /// Wait out the gap required before the next request.
    async fn pause(&mut self);
}

impl RecordSource for FdaClient {
    async fn fetch(&mut self, id: &MdrId) -> Option<Value> {
        self.fetch_record(id).await
    }

    async fn pause(&mut self) {
        let delay = self.request_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    /// Only process the first N identifiers.
    pub limit: Option<usize>,
    /// Log progress and outcome for every record.
    pub verbose: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            limit: None,
            verbose: false,
        }
    }
}

#[derive(Debug)]
pub struct BatchOutput {
    pub records: Vec<ExtractedRecord>,
    pub summary: ExtractionSummary,
    pub json_path: PathBuf,
    /// `None` when there was nothing to put in the CSV.
    pub csv_path: Option<PathBuf>,
}

/// Extract every record listed in a batch links file and write the results.
///
/// Identifiers are fetched one at a time, in file order, letting the source
/// pause after each request. Records that can't be fetched
/// are counted as failures; the run itself only fails on I/O errors or when
/// the input holds no identifiers.
pub async fn extract_batch<S: RecordSource>(
    source: &mut S,
    input: &Path,
    options: &BatchOptions,
) -> Result<BatchOutput> {
    std::fs::create_dir_all(&options.output_dir).with_context(|| {
        format!("Failed to create output directory {}", options.output_dir.display())
    })?;

    let mut ids = links::parse_batch_links(input)?;
    if ids.is_empty() {
        return Err(ExtractError::NoIdentifiers(input.to_path_buf()).into());
    }

    if let Some(limit) = options.limit {
        if limit < ids.len() {
            ids.truncate(limit);
            tracing::info!(limit, "Limited to first {limit} records");
        }
    }

    let total = ids.len();
    tracing::info!(records = total, "Starting data extraction");

    let mut records = Vec::new();
    let mut summary = ExtractionSummary::default();

    for (i, id) in ids.iter().enumerate() {
        let n = i + 1;
        if options.verbose || n % PROGRESS_EVERY == 0 || n == total {
            tracing::info!(progress = %format!("{n}/{total}"), "Progress");
        }

        match source.fetch(id).await {
            Some(raw) => {
                records.push(ExtractedRecord::new(id, raw));
                summary.record_success();
                if options.verbose {
                    tracing::info!(mdrfoi_id = %id, "Extracted record");
                }
            }
            None => {
                summary.record_failure();
                if options.verbose {
                    tracing::info!(mdrfoi_id = %id, "Failed to extract record");
                }
            }
        }

        source.pause().await;
    }

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let json_path = options.output_dir.join(format!("maude_batch_data_{stamp}.json"));
    let csv_path = options.output_dir.join(format!("maude_batch_data_{stamp}.csv"));

    output::write_json(&records, &json_path)?;
    let csv_path = output::write_csv(&records, &csv_path)?.then_some(csv_path);

    tracing::info!(
        total = summary.requested,
        succeeded = summary.succeeded,
        failed = summary.failed,
        success_rate = %format!("{:.1}%", summary.success_rate()),
        "Extraction summary"
    );
    tracing::info!(path = %json_path.display(), "JSON output");
    if let Some(path) = &csv_path {
        tracing::info!(path = %path.display(), "CSV output");
    }

    Ok(BatchOutput {
        records,
        summary,
        json_path,
        csv_path,
    })
}
