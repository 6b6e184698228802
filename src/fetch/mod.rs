//! Loading raw trip bytes from a local file or an HTTP(S) URL.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Loads trip data from a local path or fetches it over HTTP.
///
/// Sources ending in `.gz` are decompressed before being returned.
#[tracing::instrument(skip_all, fields(source = %source))]
pub async fn load_source(source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = BasicClient::new();
        fetch_bytes(&client, source).await?
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read '{source}'"))?
    };
    debug!(bytes = bytes.len(), "Source bytes loaded");

    if source.ends_with(".gz") {
        return gunzip(&bytes).with_context(|| format!("Failed to decompress '{source}'"));
    }
    Ok(bytes)
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
