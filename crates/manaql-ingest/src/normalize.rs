//! Normalizer: raw catalog record → canonical card / printing projections
//!
//! The card projection carries everything shared by all printings of a name;
//! the printing projection carries what differs per publication (set,
//! collector number, images, finishes, prices).

use std::collections::BTreeSet;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use manaql_common::types::{classify, Color, Finish, Game, LegalityBitmap};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::{CanonicalCard, CardId, CardPrinting, Prices, RawCatalogEntry};

/// Promo tag marking a numbered printing
const SERIALIZED_PROMO_TAG: &str = "serialized";

/// Collector numbers like `99z` were used for serialized printings before the
/// promo tag existed
const SERIALIZED_COLLECTOR_PATTERN: &str = r"^\d+z$";

/// Errors that make a single record unusable
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("record is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid serialization pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// How a printing is recognised as serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationRule {
    /// `promo_types` contains `serialized`
    #[default]
    PromoType,
    /// Collector number matches `^\d+z$`. Older heuristic, opt-in only.
    CollectorNumber,
}

impl SerializationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationRule::PromoType => "promo_type",
            SerializationRule::CollectorNumber => "collector_number",
        }
    }
}

impl FromStr for SerializationRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "promo_type" => Ok(SerializationRule::PromoType),
            "collector_number" => Ok(SerializationRule::CollectorNumber),
            other => Err(format!(
                "unknown serialization rule '{}' (expected promo_type or collector_number)",
                other
            )),
        }
    }
}

impl std::fmt::Display for SerializationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Front and back image URIs of a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageUris {
    pub front: Option<String>,
    pub back: Option<String>,
}

/// Pull the "normal" image URIs out of a record.
///
/// A top-level image set wins and never yields a back image. Otherwise the
/// first face gives the front and the second face, if it has images, the back.
pub fn extract_image_uris(record: &RawCatalogEntry) -> ImageUris {
    if let Some(images) = record.get("image_uris").filter(|v| !v.is_null()) {
        return ImageUris {
            front: normal_uri(images),
            back: None,
        };
    }

    let faces = match record.get("card_faces").and_then(Value::as_array) {
        Some(faces) => faces,
        None => return ImageUris::default(),
    };

    ImageUris {
        front: faces.first().and_then(|f| f.get("image_uris")).and_then(normal_uri),
        back: faces.get(1).and_then(|f| f.get("image_uris")).and_then(normal_uri),
    }
}

fn normal_uri(images: &Value) -> Option<String> {
    images.get("normal").and_then(Value::as_str).map(str::to_string)
}

/// Record normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    rule: SerializationRule,
    collector_pattern: Option<Regex>,
}

impl Normalizer {
    pub fn new(rule: SerializationRule) -> Result<Self, NormalizeError> {
        let collector_pattern = match rule {
            SerializationRule::PromoType => None,
            SerializationRule::CollectorNumber => Some(Regex::new(SERIALIZED_COLLECTOR_PATTERN)?),
        };
        Ok(Self {
            rule,
            collector_pattern,
        })
    }

    pub fn rule(&self) -> SerializationRule {
        self.rule
    }

    /// Card-level projection of a record
    pub fn to_card(&self, record: &RawCatalogEntry) -> Result<CanonicalCard, NormalizeError> {
        let name = required_str(record, "name")?;
        let type_line = optional_str(record, "type_line");

        let legalities = match record.get("legalities").and_then(Value::as_object) {
            Some(table) => LegalityBitmap::encode(
                table
                    .iter()
                    .filter_map(|(format, status)| status.as_str().map(|s| (format.as_str(), s))),
            ),
            None => LegalityBitmap::default(),
        };

        Ok(CanonicalCard {
            name: name.to_string(),
            primary_type: classify(type_line.as_deref()),
            type_line,
            oracle_text: optional_str(record, "oracle_text"),
            keywords: keywords(record),
            cmc: record.get("cmc").and_then(Value::as_f64),
            mana_cost: optional_str(record, "mana_cost"),
            colors: colors(record, "colors")?,
            color_identity: colors(record, "color_identity")?,
            power: optional_str(record, "power"),
            toughness: optional_str(record, "toughness"),
            games: games(record),
            legalities,
            reserved: flag(record, "reserved"),
            game_changer: flag(record, "game_changer"),
        })
    }

    /// Printing-level projection of a record, owned by `card_id`.
    ///
    /// The result may lack a front image; the caller decides whether to keep it.
    pub fn to_printing(
        &self,
        record: &RawCatalogEntry,
        card_id: CardId,
    ) -> Result<CardPrinting, NormalizeError> {
        let collector_number = required_str(record, "collector_number")?.to_string();
        let images = extract_image_uris(record);

        Ok(CardPrinting {
            card_id,
            card_name: required_str(record, "name")?.to_string(),
            set_code: required_str(record, "set")?.to_string(),
            set_name: required_str(record, "set_name")?.to_string(),
            serialized: self.is_serialized(record, &collector_number),
            collector_number,
            image_uri: images.front,
            back_image_uri: images.back,
            finishes: finishes(record)?,
            prices: prices(record)?,
        })
    }

    fn is_serialized(&self, record: &RawCatalogEntry, collector_number: &str) -> bool {
        match (&self.rule, &self.collector_pattern) {
            (SerializationRule::CollectorNumber, Some(pattern)) => {
                pattern.is_match(collector_number)
            }
            _ => record
                .get("promo_types")
                .and_then(Value::as_array)
                .is_some_and(|tags| {
                    tags.iter()
                        .any(|tag| tag.as_str() == Some(SERIALIZED_PROMO_TAG))
                }),
        }
    }
}

fn required_str<'a>(
    record: &'a RawCatalogEntry,
    field: &'static str,
) -> Result<&'a str, NormalizeError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField(field))
}

fn optional_str(record: &RawCatalogEntry, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

fn flag(record: &RawCatalogEntry, field: &str) -> bool {
    record.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn str_items<'a>(record: &'a RawCatalogEntry, field: &str) -> impl Iterator<Item = &'a str> {
    record
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn keywords(record: &RawCatalogEntry) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in str_items(record, "keywords") {
        if !out.iter().any(|k| k == keyword) {
            out.push(keyword.to_string());
        }
    }
    out
}

fn colors(
    record: &RawCatalogEntry,
    field: &'static str,
) -> Result<BTreeSet<Color>, NormalizeError> {
    str_items(record, field)
        .map(|symbol| {
            symbol.parse::<Color>().map_err(|_| NormalizeError::InvalidValue {
                field,
                value: symbol.to_string(),
            })
        })
        .collect()
}

/// Unknown game environments are dropped.
fn games(record: &RawCatalogEntry) -> BTreeSet<Game> {
    str_items(record, "games")
        .filter_map(|g| g.parse::<Game>().ok())
        .collect()
}

fn finishes(record: &RawCatalogEntry) -> Result<BTreeSet<Finish>, NormalizeError> {
    str_items(record, "finishes")
        .map(|finish| {
            finish.parse::<Finish>().map_err(|_| NormalizeError::InvalidValue {
                field: "finishes",
                value: finish.to_string(),
            })
        })
        .collect()
}

fn prices(record: &RawCatalogEntry) -> Result<Prices, NormalizeError> {
    let table = record.get("prices").and_then(Value::as_object);
    let price = |field: &'static str| -> Result<Option<BigDecimal>, NormalizeError> {
        match table.and_then(|t| t.get(field)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => parse_decimal(field, raw).map(Some),
            Some(Value::Number(n)) => parse_decimal(field, &n.to_string()).map(Some),
            Some(other) => Err(NormalizeError::InvalidValue {
                field,
                value: other.to_string(),
            }),
        }
    };

    Ok(Prices {
        usd: price("usd")?,
        usd_foil: price("usd_foil")?,
        usd_etched: price("usd_etched")?,
        eur: price("eur")?,
        eur_foil: price("eur_foil")?,
        // Not published upstream; filled by a later enrichment step.
        eur_etched: None,
    })
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<BigDecimal, NormalizeError> {
    BigDecimal::from_str(raw).map_err(|_| NormalizeError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}
