use anyhow::{bail, Context};
use clap::ValueEnum;
use tracing::{debug, info};

/// Default feed: the public Superstore extract the dashboard was built on.
pub const DEFAULT_SOURCE: &str =
    "https://raw.githubusercontent.com/rudyluis/DashboardJS/main/superstore_data.csv";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    #[default]
    Latin1,
    Utf8,
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads the raw feed from an http(s) URL or a local path.
pub async fn fetch(source: &str) -> anyhow::Result<Vec<u8>> {
    if is_url(source) {
        info!(%source, "downloading csv");
        let resp = reqwest::get(source)
            .await
            .with_context(|| format!("GET {source}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {source} returned {status}");
        }
        let bytes = resp.bytes().await.context("read response body")?;
        debug!(bytes = bytes.len(), "download finished");
        Ok(bytes.to_vec())
    } else {
        info!(%source, "reading csv file");
        tokio::fs::read(source)
            .await
            .with_context(|| format!("read {source}"))
    }
}

/// Decodes the feed to text, dropping a leading byte-order mark.
pub fn decode(bytes: &[u8], encoding: Encoding) -> anyhow::Result<String> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match encoding {
        // Latin-1 maps each byte to the code point of the same value.
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).context("feed is not valid utf-8"),
    }
}
