// PostgreSQL catalog store
//
// Bulk inserts use a single multi-row INSERT per batch inside its own
// transaction. Batches are capped well below the 65,535 bind-parameter limit
// by the configured batch size (see `config::MAX_BATCH_SIZE`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use super::{clip_message, CatalogStore, RunCommand, StoreError};
use crate::config::DatabaseConfig;
use crate::models::{CanonicalCard, CardId, CardPrinting, StoreCounts};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Transient(message),
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => from_sqlstate(&code, message),
                None => StoreError::Fatal(message),
            },
            _ => StoreError::Fatal(message),
        }
    }
}

/// Classify a PostgreSQL SQLSTATE code
fn from_sqlstate(code: &str, message: String) -> StoreError {
    match code {
        // connection exception
        c if c.starts_with("08") => StoreError::Transient(message),
        // serialization failure, deadlock, lock not available, too many
        // connections, admin/crash shutdown, cannot connect now
        "40001" | "40P01" | "55P03" | "53300" | "57P01" | "57P02" | "57P03" => {
            StoreError::Transient(message)
        }
        // data exception, integrity constraint violation
        c if c.starts_with("22") || c.starts_with("23") => StoreError::Integrity(message),
        _ => StoreError::Fatal(message),
    }
}

/// [`CatalogStore`] over a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Fatal(format!("migration failed: {}", e)))?;
        debug!("Schema migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn text_array<T: AsRef<str>>(items: impl IntoIterator<Item = T>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect()
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn reset(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM printing").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM card").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_cards(&self, cards: &[CanonicalCard]) -> Result<usize, StoreError> {
        if cards.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO card (id, name, main_type, type_line, oracle_text, keywords, cmc, \
             mana_cost, colors, color_identity, power, toughness, games, legalities, \
             reserved, game_changer) ",
        );

        query_builder.push_values(cards.iter(), |mut b, card| {
            b.push_bind(Uuid::new_v4())
                .push_bind(&card.name)
                .push_bind(card.primary_type.as_str())
                .push_bind(&card.type_line)
                .push_bind(&card.oracle_text)
                .push_bind(card.keywords.clone())
                .push_bind(card.cmc)
                .push_bind(&card.mana_cost)
                .push_bind(text_array(card.colors.iter().map(|c| c.as_str())))
                .push_bind(text_array(card.color_identity.iter().map(|c| c.as_str())))
                .push_bind(&card.power)
                .push_bind(&card.toughness)
                .push_bind(text_array(card.games.iter().map(|g| g.as_str())))
                .push_bind(card.legalities.to_wire().to_vec())
                .push_bind(card.reserved)
                .push_bind(card.game_changer);
        });

        let result = query_builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(result.rows_affected() as usize)
    }

    async fn insert_printings(&self, printings: &[CardPrinting]) -> Result<usize, StoreError> {
        if printings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO printing (id, card_id, set_code, set_name, collector_number, \
             serialized, image_uri, back_image_uri, finishes, price_usd, price_usd_foil, \
             price_usd_etched, price_eur, price_eur_foil, price_eur_etched) ",
        );

        query_builder.push_values(printings.iter(), |mut b, printing| {
            b.push_bind(Uuid::new_v4())
                .push_bind(printing.card_id.0)
                .push_bind(&printing.set_code)
                .push_bind(&printing.set_name)
                .push_bind(&printing.collector_number)
                .push_bind(printing.serialized)
                .push_bind(&printing.image_uri)
                .push_bind(&printing.back_image_uri)
                .push_bind(text_array(printing.finishes.iter().map(|f| f.as_str())))
                .push_bind(&printing.prices.usd)
                .push_bind(&printing.prices.usd_foil)
                .push_bind(&printing.prices.usd_etched)
                .push_bind(&printing.prices.eur)
                .push_bind(&printing.prices.eur_foil)
                .push_bind(&printing.prices.eur_etched);
        });

        let result = query_builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(result.rows_affected() as usize)
    }

    async fn lookup_by_names(&self, names: &[String]) -> Result<HashMap<String, CardId>, StoreError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, name FROM card WHERE name = ANY($1)")
                .bind(names)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| (name, CardId(id)))
            .collect())
    }

    async fn record_run(&self, command: RunCommand, message: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO run_log (command, message) VALUES ($1, $2)")
            .bind(command.as_str())
            .bind(clip_message(message))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let cards: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM card")
            .fetch_one(&self.pool)
            .await?;
        let printings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM printing")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreCounts {
            cards: cards.max(0) as u64,
            printings: printings.max(0) as u64,
        })
    }
}
