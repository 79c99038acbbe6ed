//! Record filter
//!
//! Only English, normal-layout, paper-available records make it into the
//! catalog. Tokens, art cards, emblems and digital-only cards are dropped here.

use serde_json::Value;

use crate::models::RawCatalogEntry;

const ACCEPTED_LANG: &str = "en";
const ACCEPTED_LAYOUT: &str = "normal";
const REQUIRED_GAME: &str = "paper";

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Language,
    Layout,
    NotInPaper,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Language => "language",
            RejectReason::Layout => "layout",
            RejectReason::NotInPaper => "not_in_paper",
        }
    }
}

/// First rule the record breaks, if any. Missing fields count as a mismatch.
pub fn rejection_reason(record: &RawCatalogEntry) -> Option<RejectReason> {
    if str_field(record, "lang") != Some(ACCEPTED_LANG) {
        return Some(RejectReason::Language);
    }
    if str_field(record, "layout") != Some(ACCEPTED_LAYOUT) {
        return Some(RejectReason::Layout);
    }

    let in_paper = record
        .get("games")
        .and_then(Value::as_array)
        .is_some_and(|games| games.iter().any(|g| g.as_str() == Some(REQUIRED_GAME)));
    if !in_paper {
        return Some(RejectReason::NotInPaper);
    }

    None
}

pub fn is_rejected(record: &RawCatalogEntry) -> bool {
    rejection_reason(record).is_some()
}

fn str_field<'a>(record: &'a RawCatalogEntry, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}
