//! End-to-end ingestion tests against the in-memory store
//!
//! These tests cover:
//! - Filtering, deduplication and the card/printing split
//! - Serialized detection and image extraction
//! - Sequential and parallel strategies producing the same catalog
//! - Retry, integrity isolation and abort behaviour
//! - Run reset and data-consistency reporting

mod common;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{coordinator, fast_retry, printing, sample_catalog, with, without};
use manaql_common::types::{Finish, LegalityBitmap, LegalityStatus, PrimaryType};
use manaql_ingest::catalog::{CatalogSource, CatalogStream, SourceError};
use manaql_ingest::coordinator::{IngestError, IngestReport, Pass, RunContext};
use manaql_ingest::models::RawCatalogEntry;
use manaql_ingest::normalize::{Normalizer, SerializationRule};
use manaql_ingest::store::{CatalogStore, MemoryCatalogStore};
use manaql_ingest::strategy::ExecutionStrategy;
use manaql_ingest::IngestionCoordinator;
use serde_json::json;

const PARALLEL: ExecutionStrategy = ExecutionStrategy::Parallel { workers: 4 };

fn assert_accounted(report: &IngestReport) {
    assert_eq!(
        report.printings_created + report.printings_skipped_no_image + report.records_failed,
        report.records_seen,
        "every accepted record is written, skipped or failed: {:?}",
        report
    );
}

// ============================================================================
// Filtering and deduplication
// ============================================================================

#[tokio::test]
async fn test_reprints_share_one_card() {
    let store = MemoryCatalogStore::new();
    let catalog = vec![
        printing("Forest", "lea", "294"),
        printing("Forest", "m21", "274"),
        with(printing("Forest", "m21", "274"), "lang", json!("ja")),
        with(printing("Forest", "ovnt", "1"), "games", json!(["arena"])),
        with(printing("Forest Token", "tm21", "1"), "layout", json!("token")),
    ];

    let report = coordinator(&store, ExecutionStrategy::Sequential, 100)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    assert_eq!(report.cards_created, 1);
    assert_eq!(report.printings_created, 2);
    assert_eq!(report.records_seen, 2);
    assert_eq!(report.records_filtered, 3);
    assert!(report.failed_names.is_empty());
    assert_accounted(&report);

    let cards = store.cards().unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].card.name, "Forest");
    assert_eq!(cards[0].card.primary_type, PrimaryType::Creature);

    let printings = store.printings().unwrap();
    assert!(printings.iter().all(|p| p.printing.card_id == cards[0].id));
    let sets: HashSet<&str> = printings.iter().map(|p| p.printing.set_code.as_str()).collect();
    assert_eq!(sets, HashSet::from(["lea", "m21"]));
}

#[tokio::test]
async fn test_card_fields_come_from_first_record() {
    let store = MemoryCatalogStore::new();
    let catalog = vec![
        with(
            printing("Llanowar Elves", "lea", "210"),
            "legalities",
            json!({"modern": "legal", "vintage": "restricted", "nonsense": "legal"}),
        ),
        with(
            printing("Llanowar Elves", "dom", "168"),
            "legalities",
            json!({"modern": "banned"}),
        ),
    ];

    coordinator(&store, ExecutionStrategy::Sequential, 100)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    let card = &store.cards().unwrap()[0].card;
    assert_eq!(
        card.legalities,
        LegalityBitmap::encode([("modern", "legal"), ("vintage", "restricted")])
    );
    assert_eq!(card.legalities.get("modern"), LegalityStatus::Legal);
    assert_eq!(card.legalities.get("standard"), LegalityStatus::NotLegal);
}

// ============================================================================
// Printing details
// ============================================================================

#[tokio::test]
async fn test_serialized_by_promo_type() {
    let store = MemoryCatalogStore::new();
    let catalog = vec![
        with(
            printing("Sol Ring", "sld", "1011"),
            "promo_types",
            json!(["serialized", "boosterfun"]),
        ),
        printing("Sol Ring", "c21", "263"),
        printing("Sol Ring", "plst", "99z"),
    ];

    coordinator(&store, ExecutionStrategy::Sequential, 100)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    let serialized: BTreeMap<String, bool> = store
        .printings()
        .unwrap()
        .into_iter()
        .map(|p| (p.printing.set_code, p.printing.serialized))
        .collect();
    assert!(serialized["sld"]);
    assert!(!serialized["c21"]);
    assert!(!serialized["plst"]);
}

#[tokio::test]
async fn test_serialized_by_collector_number_when_configured() {
    let store = MemoryCatalogStore::new();
    let coordinator = IngestionCoordinator::new(
        Arc::new(store.clone()),
        ExecutionStrategy::Sequential,
        Normalizer::new(SerializationRule::CollectorNumber).unwrap(),
    );

    coordinator
        .run(
            &mut RunContext::new(),
            &vec![printing("Sol Ring", "plst", "99z"), printing("Sol Ring", "c21", "263")],
        )
        .await
        .unwrap();

    let printings = store.printings().unwrap();
    let plst = printings.iter().find(|p| p.printing.set_code == "plst").unwrap();
    let c21 = printings.iter().find(|p| p.printing.set_code == "c21").unwrap();
    assert!(plst.printing.serialized);
    assert!(!c21.printing.serialized);
}

#[tokio::test]
async fn test_face_images_and_missing_images() {
    let store = MemoryCatalogStore::new();
    let faced = with(
        without(printing("Brazen Borrower", "eld", "39"), "image_uris"),
        "card_faces",
        json!([
            {"name": "Brazen Borrower", "image_uris": {"normal": "https://img.example/front.jpg"}},
            {"name": "Petty Theft", "image_uris": {"normal": "https://img.example/back.jpg"}}
        ]),
    );
    let imageless = without(printing("Brazen Borrower", "peld", "39p"), "image_uris");

    let report = coordinator(&store, ExecutionStrategy::Sequential, 100)
        .run(&mut RunContext::new(), &vec![faced, imageless])
        .await
        .unwrap();

    assert_eq!(report.printings_created, 1);
    assert_eq!(report.printings_skipped_no_image, 1);
    assert_eq!(report.records_failed, 0);
    assert_accounted(&report);

    let stored = &store.printings().unwrap()[0].printing;
    assert_eq!(stored.image_uri.as_deref(), Some("https://img.example/front.jpg"));
    assert_eq!(stored.back_image_uri.as_deref(), Some("https://img.example/back.jpg"));
    assert!(stored.finishes.contains(&Finish::Foil));
}

// ============================================================================
// Strategies
// ============================================================================

#[tokio::test]
async fn test_strategies_build_the_same_catalog() {
    let catalog = sample_catalog(20, 50);

    let sequential_store = MemoryCatalogStore::new();
    let sequential = coordinator(&sequential_store, ExecutionStrategy::Sequential, 7)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    let parallel_store = MemoryCatalogStore::new();
    let parallel = coordinator(&parallel_store, PARALLEL, 7)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    assert_eq!(sequential.cards_created, 20);
    assert_eq!(sequential.printings_created, 50);
    assert_eq!(sequential.records_filtered, 10);
    assert_accounted(&sequential);

    assert_eq!(parallel.cards_created, sequential.cards_created);
    assert_eq!(parallel.printings_created, sequential.printings_created);
    assert_eq!(parallel.records_seen, sequential.records_seen);
    assert_eq!(parallel.records_filtered, sequential.records_filtered);
    assert_eq!(parallel.failed_names, sequential.failed_names);
    assert_eq!(parallel.strategy, PARALLEL);

    let cards = |store: &MemoryCatalogStore| {
        store
            .cards()
            .unwrap()
            .into_iter()
            .map(|c| c.card)
            .collect::<Vec<_>>()
    };
    assert_eq!(cards(&parallel_store), cards(&sequential_store));

    let printing_keys = |store: &MemoryCatalogStore| {
        let mut keys: Vec<(String, String, String)> = store
            .printings()
            .unwrap()
            .into_iter()
            .map(|p| (p.printing.card_name, p.printing.set_code, p.printing.collector_number))
            .collect();
        keys.sort();
        keys
    };
    assert_eq!(printing_keys(&parallel_store), printing_keys(&sequential_store));
}

#[tokio::test]
async fn test_report_serializes_strategy_name() {
    let store = MemoryCatalogStore::new();
    let report = coordinator(&store, PARALLEL, 10)
        .run(&mut RunContext::new(), &sample_catalog(3, 6))
        .await
        .unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["strategy"], "parallel");
    assert_eq!(value["cards_created"], 3);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let store = MemoryCatalogStore::new().with_transient_insert_failures(2);
    let report = coordinator(&store, ExecutionStrategy::Sequential, 2)
        .run(&mut RunContext::new(), &sample_catalog(4, 4))
        .await
        .unwrap();

    assert_eq!(report.cards_created, 4);
    assert_eq!(report.printings_created, 4);
    assert!(report.failed_names.is_empty());
    // 2 card chunks + 2 printing chunks + 2 failed attempts
    assert_eq!(store.insert_calls().unwrap(), 6);
}

#[tokio::test]
async fn test_integrity_failure_only_fails_offending_record() {
    let store = MemoryCatalogStore::new().with_rejected_name("Bad Card");
    let catalog = vec![
        printing("Alpha", "lea", "1"),
        printing("Bad Card", "lea", "2"),
        printing("Gamma", "lea", "3"),
        printing("Bad Card", "leb", "2"),
    ];

    let report = coordinator(&store, PARALLEL, 10)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    assert_eq!(report.cards_created, 2);
    assert_eq!(report.cards_failed, 1);
    assert_eq!(report.printings_created, 2);
    assert_eq!(report.records_failed, 2);
    assert_eq!(report.failed_names, vec!["Bad Card".to_string()]);
    assert_accounted(&report);

    let names: Vec<String> = store.cards().unwrap().into_iter().map(|c| c.card.name).collect();
    assert_eq!(names, vec!["Alpha".to_string(), "Gamma".to_string()]);
}

#[tokio::test]
async fn test_printing_integrity_failure_is_isolated() {
    let store = MemoryCatalogStore::new();
    let catalog = vec![
        printing("Forest", "lea", "294"),
        printing("Forest", "toolongset", "1"),
        printing("Island", "lea", "288"),
    ];

    let report = coordinator(&store, ExecutionStrategy::Sequential, 10)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    assert_eq!(report.cards_created, 2);
    assert_eq!(report.printings_created, 2);
    assert_eq!(report.records_failed, 1);
    assert_eq!(report.failed_names, vec!["Forest".to_string()]);
    assert_accounted(&report);
}

#[tokio::test]
async fn test_normalization_failure_skips_card_and_printings() {
    let store = MemoryCatalogStore::new();
    let catalog = vec![
        with(printing("Odd Card", "lea", "1"), "colors", json!(["X"])),
        printing("Odd Card", "leb", "1"),
        printing("Forest", "lea", "294"),
    ];

    let report = coordinator(&store, ExecutionStrategy::Sequential, 10)
        .run(&mut RunContext::new(), &catalog)
        .await
        .unwrap();

    assert_eq!(report.cards_created, 1);
    assert_eq!(report.cards_failed, 1);
    assert_eq!(report.records_failed, 2);
    assert_eq!(report.failed_names, vec!["Odd Card".to_string()]);
    assert_accounted(&report);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_abort_the_run() {
    let store = MemoryCatalogStore::new().with_transient_insert_failures(usize::MAX);
    let coordinator = coordinator(&store, PARALLEL, 2).with_retry(fast_retry(2));

    let err = coordinator
        .run(&mut RunContext::new(), &sample_catalog(5, 5))
        .await
        .unwrap_err();

    match err {
        IngestError::ChunksExhausted {
            pass,
            chunks,
            last_error,
            report,
        } => {
            assert_eq!(pass, Pass::Cards);
            assert_eq!(chunks, 3);
            assert!(last_error.is_transient());
            assert_eq!(report.cards_created, 0);
            assert_eq!(report.cards_failed, 5);
        },
        other => panic!("unexpected error: {}", other),
    }

    // every chunk ran to exhaustion
    assert_eq!(store.insert_calls().unwrap(), 6);
    assert_eq!(store.counts().await.unwrap().cards, 0);
}

// ============================================================================
// Run lifecycle
// ============================================================================

#[tokio::test]
async fn test_each_run_starts_from_an_empty_store() {
    let store = MemoryCatalogStore::new();
    let coordinator = coordinator(&store, ExecutionStrategy::Sequential, 5);
    let catalog = sample_catalog(6, 12);

    let first = coordinator.run(&mut RunContext::new(), &catalog).await.unwrap();
    let second = coordinator.run(&mut RunContext::new(), &catalog).await.unwrap();

    assert_eq!(first.cards_created, second.cards_created);
    assert!(second.failed_names.is_empty());
    assert_eq!(store.reset_count().unwrap(), 2);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.cards, 6);
    assert_eq!(counts.printings, 12);
}

/// Serves `first` on the first open and `second` on every later one
struct ShiftingSource {
    first: Vec<RawCatalogEntry>,
    second: Vec<RawCatalogEntry>,
    opens: AtomicUsize,
}

impl CatalogSource for ShiftingSource {
    fn open(&self) -> Result<CatalogStream, SourceError> {
        let records = if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
            self.first.clone()
        } else {
            self.second.clone()
        };
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

#[tokio::test]
async fn test_printing_without_created_card_is_reported() {
    let store = MemoryCatalogStore::new();
    let first = vec![printing("Forest", "lea", "294")];
    let mut second = first.clone();
    second.push(printing("Ghost", "lea", "1"));

    let source = ShiftingSource {
        first,
        second,
        opens: AtomicUsize::new(0),
    };

    let report = coordinator(&store, ExecutionStrategy::Sequential, 10)
        .run(&mut RunContext::new(), &source)
        .await
        .unwrap();

    assert_eq!(report.cards_created, 1);
    assert_eq!(report.printings_created, 1);
    assert_eq!(report.records_failed, 1);
    assert_eq!(report.failed_names, vec!["Ghost".to_string()]);
    assert_eq!(source.opens.load(Ordering::SeqCst), 2);
}
