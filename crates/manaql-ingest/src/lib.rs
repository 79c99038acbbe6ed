//! ManaQL Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Turns a bulk card-catalog export into a deduplicated card and printing
//! store.
//!
//! # Pipeline
//!
//! - **Catalog**: download the bulk export and stream its records one at a time
//! - **Filter**: keep English, normal-layout, paper records
//! - **Normalize**: project records onto cards and printings
//! - **Coordinator**: two passes (cards, then printings) written in chunks,
//!   sequentially or by a bounded pool of concurrent workers
//! - **Store**: PostgreSQL, or an in-memory store for tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use manaql_ingest::catalog::FileCatalogSource;
//! use manaql_ingest::config::IngestConfig;
//! use manaql_ingest::coordinator::{IngestionCoordinator, RunContext};
//! use manaql_ingest::store::PgCatalogStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let store = PgCatalogStore::connect(&config.database).await?;
//!     store.migrate().await?;
//!
//!     let coordinator = IngestionCoordinator::from_config(Arc::new(store), &config)?;
//!     let source = FileCatalogSource::new("./artifacts/scryfall_data.json");
//!     let report = coordinator.run(&mut RunContext::new(), &source).await?;
//!     println!("{} cards, {} printings", report.cards_created, report.printings_created);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod filter;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod store;
pub mod strategy;

pub use catalog::{CatalogSource, FileCatalogSource, SourceError};
pub use config::IngestConfig;
pub use coordinator::{IngestError, IngestReport, IngestionCoordinator, RunContext};
pub use models::{CanonicalCard, CardId, CardPrinting, RawCatalogEntry};
pub use normalize::{Normalizer, SerializationRule};
pub use retry::RetryPolicy;
pub use store::{CatalogStore, MemoryCatalogStore, PgCatalogStore, StoreError};
pub use strategy::ExecutionStrategy;
