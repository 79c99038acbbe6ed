//! Map-backed catalog store
//!
//! Holds the same constraints as the SQL schema (unique card names, printing →
//! card references, column widths) so pipeline behaviour can be exercised
//! without a database. Faults can be injected to drive the retry and
//! isolation paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{clip_message, limits, CatalogStore, RunCommand, StoreError};
use crate::models::{CanonicalCard, CardId, CardPrinting, StoreCounts};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCard {
    pub id: CardId,
    pub card: CanonicalCard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrinting {
    pub id: Uuid,
    pub printing: CardPrinting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogEntry {
    pub command: RunCommand,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    cards: HashMap<String, StoredCard>,
    card_ids: HashSet<CardId>,
    printings: Vec<StoredPrinting>,
    runs: Vec<RunLogEntry>,
    resets: usize,
}

#[derive(Debug, Default)]
struct Faults {
    transient_inserts: usize,
    transient_resets: usize,
    rejected_names: HashSet<String>,
    insert_calls: usize,
}

/// In-memory [`CatalogStore`]; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` insert calls with a transient error
    pub fn with_transient_insert_failures(self, n: usize) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.transient_inserts = n;
        }
        self
    }

    /// Fail the next `n` resets with a transient error
    pub fn with_transient_reset_failures(self, n: usize) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.transient_resets = n;
        }
        self
    }

    /// Treat any card with this name as violating a check constraint
    pub fn with_rejected_name(self, name: impl Into<String>) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.rejected_names.insert(name.into());
        }
        self
    }

    /// Snapshot of stored cards, ordered by name
    pub fn cards(&self) -> Result<Vec<StoredCard>, StoreError> {
        let tables = self.read()?;
        let mut cards: Vec<StoredCard> = tables.cards.values().cloned().collect();
        cards.sort_by(|a, b| a.card.name.cmp(&b.card.name));
        Ok(cards)
    }

    /// Snapshot of stored printings, in insertion order
    pub fn printings(&self) -> Result<Vec<StoredPrinting>, StoreError> {
        Ok(self.read()?.printings.clone())
    }

    pub fn run_log(&self) -> Result<Vec<RunLogEntry>, StoreError> {
        Ok(self.read()?.runs.clone())
    }

    /// Number of resets actually applied
    pub fn reset_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.resets)
    }

    /// Number of insert calls received, failed ones included
    pub fn insert_calls(&self) -> Result<usize, StoreError> {
        Ok(self.faults()?.insert_calls)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Fatal("store lock poisoned (read)".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Fatal("store lock poisoned (write)".to_string()))
    }

    fn faults(&self) -> Result<std::sync::MutexGuard<'_, Faults>, StoreError> {
        self.faults
            .lock()
            .map_err(|_| StoreError::Fatal("fault lock poisoned".to_string()))
    }

    /// Count the call and consume one injected transient failure, if any
    fn begin_insert(&self) -> Result<(), StoreError> {
        let mut faults = self.faults()?;
        faults.insert_calls += 1;
        if faults.transient_inserts > 0 {
            faults.transient_inserts -= 1;
            return Err(StoreError::Transient(
                "connection reset by peer".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_width(column: &str, value: &str, max: usize) -> Result<(), StoreError> {
    if value.chars().count() > max {
        return Err(StoreError::Integrity(format!(
            "value too long for {} (max {} characters)",
            column, max
        )));
    }
    Ok(())
}

fn check_printing(printing: &CardPrinting, card_ids: &HashSet<CardId>) -> Result<(), StoreError> {
    if !card_ids.contains(&printing.card_id) {
        return Err(StoreError::Integrity(format!(
            "printing {} {} references missing card {}",
            printing.set_code, printing.collector_number, printing.card_id
        )));
    }
    let image = printing.image_uri.as_deref().ok_or_else(|| {
        StoreError::Integrity("null value in column image_uri".to_string())
    })?;
    check_width("image_uri", image, limits::IMAGE_URI)?;
    if let Some(back) = &printing.back_image_uri {
        check_width("back_image_uri", back, limits::IMAGE_URI)?;
    }
    check_width("set_code", &printing.set_code, limits::SET_CODE)?;
    check_width("set_name", &printing.set_name, limits::SET_NAME)?;
    check_width(
        "collector_number",
        &printing.collector_number,
        limits::COLLECTOR_NUMBER,
    )
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn reset(&self) -> Result<(), StoreError> {
        {
            let mut faults = self.faults()?;
            if faults.transient_resets > 0 {
                faults.transient_resets -= 1;
                return Err(StoreError::Transient("lock timeout".to_string()));
            }
        }

        let mut tables = self.write()?;
        tables.printings.clear();
        tables.cards.clear();
        tables.card_ids.clear();
        tables.resets += 1;
        Ok(())
    }

    async fn insert_cards(&self, cards: &[CanonicalCard]) -> Result<usize, StoreError> {
        self.begin_insert()?;
        let rejected = self.faults()?.rejected_names.clone();

        let mut tables = self.write()?;
        let mut batch_names = HashSet::with_capacity(cards.len());
        for card in cards {
            check_width("name", &card.name, limits::CARD_NAME)?;
            if rejected.contains(&card.name) {
                return Err(StoreError::Integrity(format!(
                    "card '{}' violates check constraint",
                    card.name
                )));
            }
            if tables.cards.contains_key(&card.name) || !batch_names.insert(card.name.as_str()) {
                return Err(StoreError::Integrity(format!(
                    "duplicate key value violates unique constraint: name '{}'",
                    card.name
                )));
            }
        }

        for card in cards {
            let id = CardId::new();
            tables.card_ids.insert(id);
            tables.cards.insert(
                card.name.clone(),
                StoredCard {
                    id,
                    card: card.clone(),
                },
            );
        }
        Ok(cards.len())
    }

    async fn insert_printings(&self, printings: &[CardPrinting]) -> Result<usize, StoreError> {
        self.begin_insert()?;

        let mut tables = self.write()?;
        for printing in printings {
            check_printing(printing, &tables.card_ids)?;
        }

        tables
            .printings
            .extend(printings.iter().map(|printing| StoredPrinting {
                id: Uuid::new_v4(),
                printing: printing.clone(),
            }));
        Ok(printings.len())
    }

    async fn lookup_by_names(&self, names: &[String]) -> Result<HashMap<String, CardId>, StoreError> {
        let tables = self.read()?;
        Ok(names
            .iter()
            .filter_map(|name| tables.cards.get(name).map(|c| (name.clone(), c.id)))
            .collect())
    }

    async fn record_run(&self, command: RunCommand, message: &str) -> Result<(), StoreError> {
        self.write()?.runs.push(RunLogEntry {
            command,
            message: clip_message(message).to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let tables = self.read()?;
        Ok(StoreCounts {
            cards: tables.cards.len() as u64,
            printings: tables.printings.len() as u64,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::Prices;
    use manaql_common::types::{LegalityBitmap, PrimaryType};
    use std::collections::BTreeSet;

    fn card(name: &str) -> CanonicalCard {
        CanonicalCard {
            name: name.to_string(),
            primary_type: PrimaryType::Land,
            type_line: Some("Basic Land — Forest".to_string()),
            oracle_text: None,
            keywords: Vec::new(),
            cmc: Some(0.0),
            mana_cost: None,
            colors: BTreeSet::new(),
            color_identity: BTreeSet::new(),
            power: None,
            toughness: None,
            games: BTreeSet::new(),
            legalities: LegalityBitmap::default(),
            reserved: false,
            game_changer: false,
        }
    }

    fn printing(card_id: CardId, set_code: &str) -> CardPrinting {
        CardPrinting {
            card_id,
            card_name: "Forest".to_string(),
            set_code: set_code.to_string(),
            set_name: "Test Set".to_string(),
            collector_number: "1".to_string(),
            serialized: false,
            image_uri: Some("https://img/forest.jpg".to_string()),
            back_image_uri: None,
            finishes: BTreeSet::new(),
            prices: Prices::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryCatalogStore::new();
        assert_eq!(store.insert_cards(&[card("Forest"), card("Island")]).await.unwrap(), 2);

        let ids = store
            .lookup_by_names(&["Forest".to_string(), "Swamp".to_string()])
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains_key("Forest"));

        let forest = ids["Forest"];
        store
            .insert_printings(&[printing(forest, "lea"), printing(forest, "m21")])
            .await
            .unwrap();
        assert_eq!(
            store.counts().await.unwrap(),
            StoreCounts {
                cards: 2,
                printings: 2
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejects_whole_batch() {
        let store = MemoryCatalogStore::new();
        store.insert_cards(&[card("Forest")]).await.unwrap();

        let err = store
            .insert_cards(&[card("Island"), card("Forest")])
            .await
            .unwrap_err();
        assert!(err.is_integrity());
        assert_eq!(store.counts().await.unwrap().cards, 1);
    }

    #[tokio::test]
    async fn test_printing_requires_existing_card_and_image() {
        let store = MemoryCatalogStore::new();
        let err = store
            .insert_printings(&[printing(CardId::new(), "lea")])
            .await
            .unwrap_err();
        assert!(err.is_integrity());

        store.insert_cards(&[card("Forest")]).await.unwrap();
        let forest = store.cards().unwrap()[0].id;
        let mut imageless = printing(forest, "lea");
        imageless.image_uri = None;
        assert!(store
            .insert_printings(&[printing(forest, "m21"), imageless])
            .await
            .unwrap_err()
            .is_integrity());
        assert_eq!(store.counts().await.unwrap().printings, 0);
    }

    #[tokio::test]
    async fn test_column_width_is_enforced() {
        let store = MemoryCatalogStore::new();
        store.insert_cards(&[card("Forest")]).await.unwrap();
        let forest = store.cards().unwrap()[0].id;

        let err = store
            .insert_printings(&[printing(forest, "toolongset")])
            .await
            .unwrap_err();
        assert!(err.is_integrity());

        let err = store.insert_cards(&[card(&"x".repeat(256))]).await.unwrap_err();
        assert!(err.is_integrity());
    }

    #[tokio::test]
    async fn test_injected_transient_failures() {
        let store = MemoryCatalogStore::new().with_transient_insert_failures(1);
        let err = store.insert_cards(&[card("Forest")]).await.unwrap_err();
        assert!(err.is_transient());
        store.insert_cards(&[card("Forest")]).await.unwrap();
        assert_eq!(store.insert_calls().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_tables_and_keeps_run_log() {
        let store = MemoryCatalogStore::new();
        store.insert_cards(&[card("Forest")]).await.unwrap();
        store.record_run(RunCommand::Ingest, "started").await.unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
        assert_eq!(store.reset_count().unwrap(), 1);

        let log = store.run_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].command, RunCommand::Ingest);
    }
}
