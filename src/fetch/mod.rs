//! Download of the source datasets.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// The tabular datasets the analysis reads, as (filename, URL) pairs.
pub const SOURCES: &[(&str, &str)] = &[
    (
        "Weekly_Counts_of_Deaths_by_Jurisdiction_and_Age.csv",
        "https://data.cdc.gov/api/views/y5bj-9g5w/rows.csv?accessType=DOWNLOAD",
    ),
    (
        "Excess_Deaths_Associated_with_COVID-19.csv",
        "https://data.cdc.gov/api/views/xkkf-xrst/rows.csv?accessType=DOWNLOAD",
    ),
    (
        "Provisional_COVID-19_Deaths_by_Sex_and_Age.csv",
        "https://data.cdc.gov/api/views/9bhg-hcku/rows.csv?accessType=DOWNLOAD",
    ),
];

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Downloads every source dataset into `dir`, overwriting existing files.
pub async fn download_sources<C: HttpClient>(client: &C, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    for &(name, url) in SOURCES {
        info!(name, url, "downloading dataset");
        let bytes = fetch_bytes(client, url)
            .await
            .with_context(|| format!("downloading {name}"))?;
        std::fs::write(dir.join(name), &bytes)?;
        info!(name, bytes = bytes.len(), "dataset saved");
    }

    Ok(())
}
