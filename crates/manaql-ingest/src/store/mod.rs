//! Durable catalog store interface
//!
//! Every write is one round trip in its own transaction: a batch is applied
//! entirely or not at all. Implementations must be safe to call from several
//! workers at once; each call gets its own connection.

pub mod memory;
pub mod postgres;

pub use memory::MemoryCatalogStore;
pub use postgres::PgCatalogStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CanonicalCard, CardId, CardPrinting, StoreCounts};

/// Column widths shared by the schema and the in-memory store
pub mod limits {
    pub const CARD_NAME: usize = 255;
    pub const SET_CODE: usize = 7;
    pub const SET_NAME: usize = 255;
    pub const COLLECTOR_NUMBER: usize = 7;
    pub const IMAGE_URI: usize = 255;
    pub const RUN_MESSAGE: usize = 255;
}

/// Store failures, split by whether a retry can help
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection drop, lock timeout, serialization conflict
    #[error("transient store error: {0}")]
    Transient(String),

    /// Constraint or value violation; retrying gives the same answer
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::Integrity(_))
    }
}

/// CLI command recorded in the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunCommand {
    Download,
    Ingest,
    All,
}

impl RunCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunCommand::Download => "download",
            RunCommand::Ingest => "ingest",
            RunCommand::All => "all",
        }
    }
}

impl std::fmt::Display for RunCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence for cards, printings and the run log
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Delete every card and printing in one transaction
    async fn reset(&self) -> Result<(), StoreError>;

    /// Insert a batch of cards; returns the number written
    async fn insert_cards(&self, cards: &[CanonicalCard]) -> Result<usize, StoreError>;

    /// Insert a batch of printings; returns the number written
    async fn insert_printings(&self, printings: &[CardPrinting]) -> Result<usize, StoreError>;

    /// Resolve card names to ids. Unknown names are absent from the result.
    async fn lookup_by_names(&self, names: &[String]) -> Result<HashMap<String, CardId>, StoreError>;

    async fn record_run(&self, command: RunCommand, message: &str) -> Result<(), StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}

/// Truncate a run-log message to the column width on a char boundary
pub(crate) fn clip_message(message: &str) -> &str {
    match message.char_indices().nth(limits::RUN_MESSAGE) {
        Some((end, _)) => &message[..end],
        None => message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StoreError::Transient("connection reset".into()).is_transient());
        assert!(!StoreError::Integrity("duplicate key".into()).is_transient());
        assert!(!StoreError::Fatal("permission denied".into()).is_transient());
        assert!(StoreError::Integrity("duplicate key".into()).is_integrity());
    }

    #[test]
    fn test_clip_message() {
        assert_eq!(clip_message("short"), "short");
        let long = "é".repeat(300);
        assert_eq!(clip_message(&long).chars().count(), limits::RUN_MESSAGE);
    }
}
