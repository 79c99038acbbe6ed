//! Catalog sources
//!
//! A [`CatalogSource`] hands out a fresh lazy stream of raw records on every
//! [`open`](CatalogSource::open), so the coordinator can walk the same input
//! once per pass without buffering it.

pub mod download;
pub mod reader;

pub use download::{BulkDataClient, BulkDataEntry};
pub use reader::JsonArrayReader;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

use crate::models::RawCatalogEntry;

/// Read buffer for on-disk catalogs
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Errors raised while reading the catalog
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog element {index}: {source}")]
    Element {
        index: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed catalog: {0}")]
    Format(String),
}

/// Lazy sequence of raw records
pub type CatalogStream = Box<dyn Iterator<Item = Result<RawCatalogEntry, SourceError>> + Send>;

/// Restartable source of raw catalog records
pub trait CatalogSource: Send + Sync {
    /// Start a new pass over the records, in delivery order
    fn open(&self) -> Result<CatalogStream, SourceError>;

    /// Human-readable name for logs
    fn describe(&self) -> String {
        "catalog".to_string()
    }
}

/// Catalog stored on disk as a JSON array, optionally gzip-compressed
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_gzip(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    }
}

impl CatalogSource for FileCatalogSource {
    fn open(&self) -> Result<CatalogStream, SourceError> {
        let file = File::open(&self.path)?;
        debug!(path = %self.path.display(), gzip = self.is_gzip(), "Opening catalog file");

        let reader: Box<dyn BufRead + Send> = if self.is_gzip() {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, GzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };

        Ok(Box::new(JsonArrayReader::new(reader)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory catalog; every pass replays a copy of the records
impl CatalogSource for Vec<RawCatalogEntry> {
    fn open(&self) -> Result<CatalogStream, SourceError> {
        Ok(Box::new(self.clone().into_iter().map(Ok)))
    }

    fn describe(&self) -> String {
        format!("in-memory catalog ({} records)", self.len())
    }
}
