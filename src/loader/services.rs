use std::sync::Arc;

use anyhow::{bail, Context};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::csv_row::{CsvRow, RowError, REQUIRED_HEADERS};
use crate::sales::{FactStore, SalesLine};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Only the first failures are kept in the report; the rest are just counted.
pub const MAX_REPORTED_FAILURES: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub append: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            append: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub line: u64,
    pub order_id: Option<String>,
    pub reason: String,
}

/// Outcome of one load run.
///
/// `rows_attempted = rows_inserted + rows_skipped + rows_rolled_back`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_attempted: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub rows_rolled_back: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub dates_coerced: u64,
    pub wiped: u64,
    pub errors: Vec<RowFailure>,
}

impl LoadReport {
    fn record_failure(&mut self, line: u64, order_id: Option<String>, err: &RowError) {
        self.rows_skipped += 1;
        warn!(line, order_id = order_id.as_deref().unwrap_or(""), reason = %err, "skipping csv row");
        if self.errors.len() < MAX_REPORTED_FAILURES {
            self.errors.push(RowFailure {
                line,
                order_id,
                reason: err.to_string(),
            });
        }
    }
}

/// Bulk loader: parses the feed row by row and writes it in atomic batches.
pub struct Loader {
    store: Arc<dyn FactStore>,
    options: LoadOptions,
}

impl Loader {
    pub fn new(store: Arc<dyn FactStore>, options: LoadOptions) -> Self {
        Self { store, options }
    }

    async fn flush(&self, batch: &mut Vec<SalesLine>, report: &mut LoadReport) {
        if batch.is_empty() {
            return;
        }
        match self.store.insert_batch(batch).await {
            Ok(n) => {
                report.rows_inserted += n;
                report.batches_committed += 1;
                info!(rows = n, total = report.rows_inserted, "batch committed");
            }
            Err(e) => {
                report.rows_rolled_back += batch.len() as u64;
                report.batches_failed += 1;
                error!(error = %e, rows = batch.len(), "batch rolled back");
            }
        }
        batch.clear();
    }

    /// Loads decoded CSV text. Header problems abort before anything is wiped.
    #[instrument(skip(self, text), fields(bytes = text.len(), append = self.options.append))]
    pub async fn load_text(&self, text: &str) -> anyhow::Result<LoadReport> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: StringRecord = reader.headers().context("read csv headers")?.clone();
        let missing: Vec<&str> = REQUIRED_HEADERS
            .iter()
            .copied()
            .filter(|h| !headers.iter().any(|col| col == *h))
            .collect();
        if !missing.is_empty() {
            bail!("csv is missing required columns: {}", missing.join(", "));
        }

        let mut report = LoadReport::default();
        if !self.options.append {
            report.wiped = self.store.wipe().await.context("wipe fact table")?;
            info!(rows = report.wiped, "fact table wiped");
        }

        let batch_size = self.options.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);

        for result in reader.records() {
            report.rows_attempted += 1;
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    report.record_failure(line, None, &RowError::Malformed(e.to_string()));
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let row: CsvRow = match record.deserialize(Some(&headers)) {
                Ok(r) => r,
                Err(e) => {
                    report.record_failure(line, None, &RowError::Malformed(e.to_string()));
                    continue;
                }
            };
            let order_id = row.order_id().map(str::to_string);

            match row.into_line() {
                Ok(parsed) => {
                    report.dates_coerced += u64::from(parsed.dates_coerced);
                    batch.push(parsed.line);
                    if batch.len() >= batch_size {
                        self.flush(&mut batch, &mut report).await;
                    }
                }
                Err(e) => report.record_failure(line, order_id, &e),
            }
        }
        self.flush(&mut batch, &mut report).await;

        info!(
            attempted = report.rows_attempted,
            inserted = report.rows_inserted,
            skipped = report.rows_skipped,
            batches_failed = report.batches_failed,
            "load finished"
        );
        Ok(report)
    }
}
