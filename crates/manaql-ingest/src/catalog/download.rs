//! Bulk catalog download
//!
//! The upstream API publishes an index of bulk exports; the one whose `type`
//! matches the configured bulk type is streamed to disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::ScryfallConfig;

/// One export listed in the bulk-data index
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDataEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub download_uri: String,
    pub updated_at: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkDataIndex {
    data: Vec<BulkDataEntry>,
}

/// Pick the export of the requested type from the index
pub fn select_entry<'a>(entries: &'a [BulkDataEntry], kind: &str) -> Option<&'a BulkDataEntry> {
    entries.iter().find(|entry| entry.kind == kind)
}

/// HTTP client for the bulk-data endpoint
pub struct BulkDataClient {
    http: reqwest::Client,
    index_url: String,
    bulk_type: String,
}

impl BulkDataClient {
    pub fn new(config: &ScryfallConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            index_url: config.bulk_data_url.clone(),
            bulk_type: config.bulk_type.clone(),
        })
    }

    /// Fetch the list of available exports
    pub async fn fetch_index(&self) -> Result<Vec<BulkDataEntry>> {
        debug!(url = %self.index_url, "Fetching bulk-data index");

        let response = self
            .http
            .get(&self.index_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to request {}", self.index_url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch {}: {}", self.index_url, response.status());
        }

        let index: BulkDataIndex = response
            .json()
            .await
            .context("Failed to parse bulk-data index")?;
        Ok(index.data)
    }

    /// Download the configured export to `output_dir/file_name`
    ///
    /// Bytes land in a `.tmp` sibling first, which is renamed into place once
    /// the transfer completes.
    pub async fn download(&self, output_dir: &Path, file_name: &str) -> Result<PathBuf> {
        let entries = self.fetch_index().await?;
        let entry = select_entry(&entries, &self.bulk_type).with_context(|| {
            format!("Bulk-data index has no export of type '{}'", self.bulk_type)
        })?;

        info!(
            "Downloading {} ({:.1} MB, updated {})",
            entry.name,
            entry.size as f64 / 1024.0 / 1024.0,
            entry.updated_at
        );

        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let output_path = output_dir.join(file_name);
        let tmp_path = output_dir.join(format!("{}.tmp", file_name));

        self.download_file(&entry.download_uri, &tmp_path, entry.size)
            .await?;

        tokio::fs::rename(&tmp_path, &output_path)
            .await
            .with_context(|| format!("Failed to move download to {}", output_path.display()))?;

        info!("Saved catalog to {}", output_path.display());
        Ok(output_path)
    }

    async fn download_file(&self, url: &str, output_path: &Path, expected_size: u64) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download {}: {}", url, response.status());
        }

        let total_size = response.content_length().unwrap_or(expected_size);

        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                .progress_chars("#>-"),
        );
        pb.set_message(format!("Downloading {}", url));

        let mut file = tokio::fs::File::create(output_path)
            .await
            .with_context(|| format!("Failed to create {}", output_path.display()))?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download interrupted")?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;

        pb.finish_with_message(format!("Downloaded {} bytes", downloaded));
        Ok(())
    }
}
