pub mod csv_row;
pub mod services;
pub mod source;

use std::sync::Arc;

use tracing::info;

use crate::sales::FactStore;

pub use services::{LoadOptions, LoadReport, Loader};
pub use source::{Encoding, DEFAULT_SOURCE};

/// Fetches, decodes and loads one feed into the fact table.
pub async fn run(
    store: Arc<dyn FactStore>,
    source: &str,
    encoding: Encoding,
    options: LoadOptions,
) -> anyhow::Result<LoadReport> {
    let bytes = source::fetch(source).await?;
    let text = source::decode(&bytes, encoding)?;
    let report = Loader::new(store.clone(), options).load_text(&text).await?;
    info!(rows = store.count().await?, "fact table size after load");
    Ok(report)
}
