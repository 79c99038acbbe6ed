//! Shared fixtures for the ingest integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use manaql_ingest::models::RawCatalogEntry;
use manaql_ingest::normalize::{Normalizer, SerializationRule};
use manaql_ingest::retry::RetryPolicy;
use manaql_ingest::store::MemoryCatalogStore;
use manaql_ingest::strategy::ExecutionStrategy;
use manaql_ingest::IngestionCoordinator;
use serde_json::{json, Value};

pub fn record(value: Value) -> RawCatalogEntry {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture must be a JSON object, got {}", other),
    }
}

/// English paper printing with a front image
pub fn printing(name: &str, set: &str, collector_number: &str) -> RawCatalogEntry {
    record(json!({
        "object": "card",
        "id": format!("{}-{}-{}", name, set, collector_number),
        "name": name,
        "lang": "en",
        "layout": "normal",
        "games": ["paper", "mtgo"],
        "type_line": "Creature — Elf Druid",
        "oracle_text": "{T}: Add {G}.",
        "mana_cost": "{G}",
        "cmc": 1.0,
        "colors": ["G"],
        "color_identity": ["G"],
        "keywords": [],
        "power": "1",
        "toughness": "1",
        "legalities": {
            "standard": "not_legal",
            "modern": "legal",
            "legacy": "legal",
            "vintage": "legal",
            "pauper": "legal",
            "commander": "legal"
        },
        "reserved": false,
        "game_changer": false,
        "set": set,
        "set_name": format!("Set {}", set.to_uppercase()),
        "collector_number": collector_number,
        "finishes": ["nonfoil", "foil"],
        "promo_types": [],
        "image_uris": {
            "small": format!("https://img.example/{}/{}/small.jpg", set, collector_number),
            "normal": format!("https://img.example/{}/{}/normal.jpg", set, collector_number)
        },
        "prices": {
            "usd": "0.25",
            "usd_foil": "1.50",
            "usd_etched": null,
            "eur": "0.20",
            "eur_foil": null,
            "tix": "0.03"
        }
    }))
}

pub fn with(mut entry: RawCatalogEntry, key: &str, value: Value) -> RawCatalogEntry {
    entry.insert(key.to_string(), value);
    entry
}

pub fn without(mut entry: RawCatalogEntry, key: &str) -> RawCatalogEntry {
    entry.remove(key);
    entry
}

/// `records` printings spread round-robin over `names` distinct cards,
/// with a few records the filter drops mixed in
pub fn sample_catalog(names: usize, records: usize) -> Vec<RawCatalogEntry> {
    let mut catalog = Vec::with_capacity(records + records / 5);
    for i in 0..records {
        let name = format!("Card {:03}", i % names);
        let set = format!("s{:02}", i / names);
        let mut entry = printing(&name, &set, &(i + 1).to_string());
        if i % 3 == 0 {
            entry = with(
                entry,
                "legalities",
                json!({"modern": "banned", "vintage": "restricted", "alchemy": "legal"}),
            );
        }
        catalog.push(entry);

        if i % 5 == 0 {
            catalog.push(with(printing(&name, &set, "999"), "lang", json!("ja")));
        }
    }
    catalog
}

/// Retry policy with millisecond backoff
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(10), 2.0)
}

pub fn coordinator(
    store: &MemoryCatalogStore,
    strategy: ExecutionStrategy,
    batch_size: usize,
) -> IngestionCoordinator {
    IngestionCoordinator::new(
        Arc::new(store.clone()),
        strategy,
        Normalizer::new(SerializationRule::PromoType).expect("normalizer"),
    )
    .with_batch_size(batch_size)
    .with_retry(fast_retry(3))
}
