//! Catalog entities produced by normalization and written by the stores

use std::collections::BTreeSet;

use bigdecimal::BigDecimal;
use manaql_common::types::{Color, Finish, Game, LegalityBitmap, PrimaryType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One raw element of the catalog dump, keys kept in source order
pub type RawCatalogEntry = serde_json::Map<String, serde_json::Value>;

/// Synthetic identifier assigned to a card by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(pub Uuid);

impl CardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A unique card, keyed by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCard {
    pub name: String,
    pub primary_type: PrimaryType,
    pub type_line: Option<String>,
    pub oracle_text: Option<String>,
    /// Keywords in first-seen order, without repeats
    pub keywords: Vec<String>,
    pub cmc: Option<f64>,
    pub mana_cost: Option<String>,
    pub colors: BTreeSet<Color>,
    pub color_identity: BTreeSet<Color>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub games: BTreeSet<Game>,
    pub legalities: LegalityBitmap,
    pub reserved: bool,
    pub game_changer: bool,
}

/// Market prices of one printing; any of them may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub usd: Option<BigDecimal>,
    pub usd_foil: Option<BigDecimal>,
    pub usd_etched: Option<BigDecimal>,
    pub eur: Option<BigDecimal>,
    pub eur_foil: Option<BigDecimal>,
    pub eur_etched: Option<BigDecimal>,
}

/// One physical printing of a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPrinting {
    pub card_id: CardId,
    pub card_name: String,
    pub set_code: String,
    pub set_name: String,
    pub collector_number: String,
    pub serialized: bool,
    /// Front-face image; printings without one are never stored
    pub image_uri: Option<String>,
    pub back_image_uri: Option<String>,
    pub finishes: BTreeSet<Finish>,
    pub prices: Prices,
}

impl CardPrinting {
    pub fn has_front_image(&self) -> bool {
        self.image_uri.as_deref().is_some_and(|uri| !uri.is_empty())
    }
}

/// Row counts of the catalog tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub cards: u64,
    pub printings: u64,
}
