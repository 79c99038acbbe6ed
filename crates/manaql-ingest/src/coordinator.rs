// Ingestion coordinator
//
// One run = reset, pass 1 (cards), name resolution, pass 2 (printings).
//
// Both passes stream the source independently and apply the same filter.
// Chunking, deduplication and normalization happen on the driver in input
// order, so chunk contents are identical under every strategy; only the
// order in which chunks are written differs.
//
// Per chunk:
// - transient store errors are retried with backoff
// - an integrity error replays the chunk one record per transaction so only
//   the offending records are marked failed
// - an exhausted retry or fatal error fails the chunk; sibling chunks still
//   run and the run is aborted once the pass completes

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogSource, CatalogStream, SourceError};
use crate::config::{IngestConfig, DEFAULT_BATCH_SIZE};
use crate::filter;
use crate::models::{CanonicalCard, CardId, CardPrinting, RawCatalogEntry};
use crate::normalize::{NormalizeError, Normalizer};
use crate::retry::RetryPolicy;
use crate::store::{CatalogStore, StoreError};
use crate::strategy::ExecutionStrategy;

const UNNAMED: &str = "<unnamed>";

/// Run-scoped state threaded through the coordinator
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    reset_done: bool,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            reset_done: false,
        }
    }

    /// Whether the store has already been cleared in this run
    pub fn is_reset(&self) -> bool {
        self.reset_done
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    Cards,
    Printings,
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::Cards => f.write_str("card"),
            Pass::Printings => f.write_str("printing"),
        }
    }
}

/// Aggregate result of an ingestion run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub cards_created: u64,
    pub printings_created: u64,
    /// Records that passed the filter
    pub records_seen: u64,
    pub records_filtered: u64,
    pub printings_skipped_no_image: u64,
    /// Card names that could not be created
    pub cards_failed: u64,
    /// Accepted records that did not produce a printing
    pub records_failed: u64,
    /// Names (or ids, for unnamed records) of everything that failed, sorted
    pub failed_names: Vec<String>,
    pub strategy: ExecutionStrategy,
    pub duration_secs: f64,
}

/// Run-level failures; per-record problems are reported in [`IngestReport`]
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to reset catalog store: {0}")]
    Reset(#[source] StoreError),

    #[error("catalog source failed: {0}")]
    Source(#[from] SourceError),

    #[error("failed to resolve card ids: {0}")]
    Lookup(#[source] StoreError),

    #[error("{pass} pass aborted: {chunks} chunk(s) could not be written, last error: {last_error}")]
    ChunksExhausted {
        pass: Pass,
        chunks: usize,
        last_error: StoreError,
        /// Counts up to the point of failure
        report: Box<IngestReport>,
    },
}

/// An entity written in batches by one of the passes
trait Persist: Sized + Send + Sync {
    const ENTITY: &'static str;

    /// Name used in failure lists
    fn key(&self) -> &str;

    fn insert<'a>(
        store: &'a dyn CatalogStore,
        batch: &'a [Self],
    ) -> BoxFuture<'a, Result<usize, StoreError>>;
}

impl Persist for CanonicalCard {
    const ENTITY: &'static str = "card";

    fn key(&self) -> &str {
        &self.name
    }

    fn insert<'a>(
        store: &'a dyn CatalogStore,
        batch: &'a [Self],
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        store.insert_cards(batch)
    }
}

impl Persist for CardPrinting {
    const ENTITY: &'static str = "printing";

    fn key(&self) -> &str {
        &self.card_name
    }

    fn insert<'a>(
        store: &'a dyn CatalogStore,
        batch: &'a [Self],
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        store.insert_printings(batch)
    }
}

/// What happened to one chunk
#[derive(Debug, Default)]
struct ChunkOutcome {
    written: u64,
    failed: Vec<String>,
    aborted: Option<StoreError>,
}

/// Driver-side counters for a run
#[derive(Debug, Default)]
struct Tally {
    cards_created: u64,
    printings_created: u64,
    records_seen: u64,
    records_filtered: u64,
    skipped_no_image: u64,
    cards_failed: u64,
    records_failed: u64,
    failed_names: BTreeSet<String>,
}

/// Why a pass stopped early
enum PassFailure {
    Source(SourceError),
    Chunks { chunks: usize, last_error: StoreError },
}

/// Card-creation pass results needed by the printing pass
struct CardPass {
    /// Names queued for insertion, in first-seen order
    queued: Vec<String>,
    /// Names whose card could not be created
    failed: HashSet<String>,
}

pub struct IngestionCoordinator {
    store: Arc<dyn CatalogStore>,
    normalizer: Normalizer,
    strategy: ExecutionStrategy,
    batch_size: usize,
    retry: RetryPolicy,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        strategy: ExecutionStrategy,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            store,
            normalizer,
            strategy,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(
        store: Arc<dyn CatalogStore>,
        config: &IngestConfig,
    ) -> Result<Self, NormalizeError> {
        Ok(Self::new(
            store,
            config.strategy,
            Normalizer::new(config.serialization_rule)?,
        )
        .with_batch_size(config.batch_size)
        .with_retry(config.retry.clone()))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Clear all cards and printings, once per run.
    ///
    /// Returns `false` when the store was already reset in this run.
    pub async fn reset(&self, ctx: &mut RunContext) -> Result<bool, IngestError> {
        if ctx.reset_done {
            debug!(run_id = %ctx.run_id, "Store already reset in this run");
            return Ok(false);
        }

        let store = self.store.as_ref();
        self.retry
            .run("reset", StoreError::is_transient, move || store.reset())
            .await
            .map_err(IngestError::Reset)?;

        ctx.reset_done = true;
        info!(run_id = %ctx.run_id, "Cleared existing cards and printings");
        Ok(true)
    }

    /// Ingest `source` into the store
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        source: &dyn CatalogSource,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        info!(
            run_id = %ctx.run_id,
            strategy = %self.strategy,
            batch_size = self.batch_size,
            serialization_rule = %self.normalizer.rule(),
            "Starting ingestion from {}",
            source.describe()
        );

        self.reset(ctx).await?;

        let mut tally = Tally::default();

        let cards = match self.card_pass(source, &mut tally).await {
            Ok(cards) => cards,
            Err(failure) => return Err(self.abort(ctx, Pass::Cards, failure, &tally, started)),
        };
        info!(
            "Card pass complete: {} cards created, {} failed, {} records filtered",
            tally.cards_created, tally.cards_failed, tally.records_filtered
        );

        let card_ids = self.resolve_card_ids(&cards).await?;

        if let Err(failure) = self.printing_pass(source, &cards, &card_ids, &mut tally).await {
            return Err(self.abort(ctx, Pass::Printings, failure, &tally, started));
        }
        info!(
            "Printing pass complete: {} printings created, {} without image, {} records failed",
            tally.printings_created, tally.skipped_no_image, tally.records_failed
        );

        let report = self.report(ctx, &tally, started);
        info!(
            "Ingestion complete: {} cards, {} printings, {} failed in {:.2}s",
            report.cards_created,
            report.printings_created,
            report.failed_names.len(),
            report.duration_secs
        );
        Ok(report)
    }

    /// Pass 1: create one card per distinct name, first seen wins
    async fn card_pass(
        &self,
        source: &dyn CatalogSource,
        tally: &mut Tally,
    ) -> Result<CardPass, PassFailure> {
        let mut stream = source.open().map_err(PassFailure::Source)?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut pass = CardPass {
            queued: Vec::new(),
            failed: HashSet::new(),
        };
        let mut source_error = None;

        let outcomes = {
            let batch_size = self.batch_size;
            let normalizer = &self.normalizer;
            let queued = &mut pass.queued;
            let failed = &mut pass.failed;
            let tally = &mut *tally;
            let source_error = &mut source_error;

            let chunks = std::iter::from_fn(move || {
                let mut chunk = Vec::with_capacity(batch_size);
                while chunk.len() < batch_size {
                    let Some(record) = next_record(&mut stream, source_error) else {
                        break;
                    };
                    if filter::is_rejected(&record) {
                        tally.records_filtered += 1;
                        continue;
                    }
                    tally.records_seen += 1;

                    // Unnamed records are reported by the printing pass.
                    let Some(name) = record_name(&record) else {
                        continue;
                    };
                    if !seen.insert(name.to_string()) {
                        continue;
                    }

                    match normalizer.to_card(&record) {
                        Ok(card) => {
                            queued.push(card.name.clone());
                            chunk.push(card);
                        }
                        Err(e) => {
                            warn!(name, "Failed to normalize card: {}", e);
                            tally.cards_failed += 1;
                            tally.failed_names.insert(name.to_string());
                            failed.insert(name.to_string());
                        }
                    }
                }
                (!chunk.is_empty()).then_some(chunk)
            });

            self.strategy
                .execute(chunks, |index, cards| {
                    self.write_chunk(Pass::Cards, index, cards)
                })
                .await
        };

        if let Some(e) = source_error {
            return Err(PassFailure::Source(e));
        }

        let mut aborted = Vec::new();
        for outcome in outcomes {
            tally.cards_created += outcome.written;
            tally.cards_failed += outcome.failed.len() as u64;
            for name in outcome.failed {
                pass.failed.insert(name.clone());
                tally.failed_names.insert(name);
            }
            aborted.extend(outcome.aborted);
        }
        check_aborted(aborted)?;

        Ok(pass)
    }

    /// Map every created card name to its id, in batches
    async fn resolve_card_ids(&self, cards: &CardPass) -> Result<HashMap<String, CardId>, IngestError> {
        let created: Vec<String> = cards
            .queued
            .iter()
            .filter(|name| !cards.failed.contains(*name))
            .cloned()
            .collect();

        let store = self.store.as_ref();
        let mut card_ids = HashMap::with_capacity(created.len());
        for names in created.chunks(self.batch_size) {
            let ids = self
                .retry
                .run("card lookup", StoreError::is_transient, move || {
                    store.lookup_by_names(names)
                })
                .await
                .map_err(IngestError::Lookup)?;
            card_ids.extend(ids);
        }

        if card_ids.len() != created.len() {
            error!(
                "Data consistency: {} of {} created cards could not be resolved by name",
                created.len() - card_ids.len(),
                created.len()
            );
        }
        debug!("Resolved {} card ids", card_ids.len());
        Ok(card_ids)
    }

    /// Pass 2: one printing per accepted record whose card exists
    async fn printing_pass(
        &self,
        source: &dyn CatalogSource,
        cards: &CardPass,
        card_ids: &HashMap<String, CardId>,
        tally: &mut Tally,
    ) -> Result<(), PassFailure> {
        let mut stream = source.open().map_err(PassFailure::Source)?;
        let mut source_error = None;
        let mut accepted = 0u64;

        let outcomes = {
            let batch_size = self.batch_size;
            let normalizer = &self.normalizer;
            let tally = &mut *tally;
            let accepted = &mut accepted;
            let source_error = &mut source_error;

            let chunks = std::iter::from_fn(move || {
                let mut chunk = Vec::with_capacity(batch_size);
                while chunk.len() < batch_size {
                    let Some(record) = next_record(&mut stream, source_error) else {
                        break;
                    };
                    if filter::is_rejected(&record) {
                        continue;
                    }
                    *accepted += 1;

                    let Some(name) = record_name(&record) else {
                        let label = record_label(&record);
                        warn!(record = %label, "Skipping record without a name");
                        tally.records_failed += 1;
                        tally.failed_names.insert(label);
                        continue;
                    };
                    if cards.failed.contains(name) {
                        debug!(name, "Skipping printing of failed card");
                        tally.records_failed += 1;
                        continue;
                    }
                    let Some(card_id) = card_ids.get(name).copied() else {
                        error!(
                            name,
                            "Data consistency: printing references a card that was not created in this run"
                        );
                        tally.records_failed += 1;
                        tally.failed_names.insert(name.to_string());
                        continue;
                    };

                    match normalizer.to_printing(&record, card_id) {
                        Ok(printing) if printing.has_front_image() => chunk.push(printing),
                        Ok(_) => tally.skipped_no_image += 1,
                        Err(e) => {
                            warn!(name, "Failed to normalize printing: {}", e);
                            tally.records_failed += 1;
                            tally.failed_names.insert(name.to_string());
                        }
                    }
                }
                (!chunk.is_empty()).then_some(chunk)
            });

            self.strategy
                .execute(chunks, |index, printings| {
                    self.write_chunk(Pass::Printings, index, printings)
                })
                .await
        };

        if let Some(e) = source_error {
            return Err(PassFailure::Source(e));
        }
        if accepted != tally.records_seen {
            error!(
                "Data consistency: card pass accepted {} records, printing pass {}",
                tally.records_seen, accepted
            );
        }

        let mut aborted = Vec::new();
        for outcome in outcomes {
            tally.printings_created += outcome.written;
            tally.records_failed += outcome.failed.len() as u64;
            tally.failed_names.extend(outcome.failed);
            aborted.extend(outcome.aborted);
        }
        check_aborted(aborted)
    }

    /// Write one chunk, isolating bad records on integrity errors
    async fn write_chunk<T: Persist>(&self, pass: Pass, index: usize, items: Vec<T>) -> ChunkOutcome {
        let store: &dyn CatalogStore = self.store.as_ref();
        let batch: &[T] = &items;
        let operation = format!("{} batch {}", pass, index + 1);
        let mut outcome = ChunkOutcome::default();

        let result = self
            .retry
            .run(&operation, StoreError::is_transient, move || T::insert(store, batch))
            .await;

        match result {
            Ok(written) => {
                outcome.written = written as u64;
                debug!("{}: wrote {} {}s", operation, written, T::ENTITY);
            }
            Err(e) if e.is_integrity() => {
                warn!(
                    "{} rejected ({}); writing {} records individually",
                    operation,
                    e,
                    batch.len()
                );
                for (position, item) in batch.iter().enumerate() {
                    let single = std::slice::from_ref(item);
                    let result = self
                        .retry
                        .run(&operation, StoreError::is_transient, move || T::insert(store, single))
                        .await;
                    match result {
                        Ok(written) => outcome.written += written as u64,
                        Err(e) if e.is_integrity() => {
                            warn!(name = item.key(), "Failed to write {}: {}", T::ENTITY, e);
                            outcome.failed.push(item.key().to_string());
                        }
                        Err(e) => {
                            error!("{} failed: {}", operation, e);
                            outcome
                                .failed
                                .extend(batch[position..].iter().map(|i| i.key().to_string()));
                            outcome.aborted = Some(e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!("{} failed: {}", operation, e);
                outcome.failed = batch.iter().map(|i| i.key().to_string()).collect();
                outcome.aborted = Some(e);
            }
        }

        outcome
    }

    fn abort(
        &self,
        ctx: &RunContext,
        pass: Pass,
        failure: PassFailure,
        tally: &Tally,
        started: Instant,
    ) -> IngestError {
        match failure {
            PassFailure::Source(e) => {
                error!("{} pass stopped, catalog source failed: {}", pass, e);
                IngestError::Source(e)
            }
            PassFailure::Chunks { chunks, last_error } => {
                error!("{} pass aborted: {} chunk(s) failed", pass, chunks);
                IngestError::ChunksExhausted {
                    pass,
                    chunks,
                    last_error,
                    report: Box::new(self.report(ctx, tally, started)),
                }
            }
        }
    }

    fn report(&self, ctx: &RunContext, tally: &Tally, started: Instant) -> IngestReport {
        IngestReport {
            run_id: ctx.run_id,
            cards_created: tally.cards_created,
            printings_created: tally.printings_created,
            records_seen: tally.records_seen,
            records_filtered: tally.records_filtered,
            printings_skipped_no_image: tally.skipped_no_image,
            cards_failed: tally.cards_failed,
            records_failed: tally.records_failed,
            failed_names: tally.failed_names.iter().cloned().collect(),
            strategy: self.strategy,
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }
}

/// Next record, or `None` at the end of the stream or after its first error
fn next_record(
    stream: &mut CatalogStream,
    source_error: &mut Option<SourceError>,
) -> Option<RawCatalogEntry> {
    if source_error.is_some() {
        return None;
    }
    match stream.next()? {
        Ok(record) => Some(record),
        Err(e) => {
            *source_error = Some(e);
            None
        }
    }
}

fn check_aborted(aborted: Vec<StoreError>) -> Result<(), PassFailure> {
    let chunks = aborted.len();
    match aborted.into_iter().last() {
        Some(last_error) => Err(PassFailure::Chunks { chunks, last_error }),
        None => Ok(()),
    }
}

fn record_name(record: &RawCatalogEntry) -> Option<&str> {
    record
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// Identifier for records that have no usable name
fn record_label(record: &RawCatalogEntry) -> String {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(|id| format!("{} ({})", UNNAMED, id))
        .unwrap_or_else(|| UNNAMED.to_string())
}
