//! Packed format-legality bitmap
//!
//! Every card carries a status for each of the 22 supported play formats.
//! Each status takes 2 bits:
//!
//! | bits | status       |
//! |------|--------------|
//! | 00   | `not_legal`  |
//! | 01   | `legal`      |
//! | 10   | `banned`     |
//! | 11   | `restricted` |
//!
//! Format `n` in [`Format::ALL`] occupies bits `2n..2n+2`, giving 44 bits that
//! are stored as a 6-byte big-endian integer. The offset table is part of the
//! persisted format: new formats must take fresh offsets at the end, existing
//! ones are never renumbered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ManaqlError;

/// Width of one format's status field
const BITS_PER_FORMAT: u32 = 2;

const STATUS_MASK: u64 = 0b11;

/// Errors raised when a stored bitmap is out of range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LegalityError {
    #[error("legality bitmap cannot be negative (got {0})")]
    Negative(i64),

    #[error("legality bitmap {0:#x} exceeds 44 bits")]
    TooLarge(u64),

    #[error("legality bitmap must be {expected} bytes on the wire, got {actual}")]
    WireLength { expected: usize, actual: usize },
}

/// Supported play formats, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Standard,
    Future,
    Historic,
    Timeless,
    Gladiator,
    Pioneer,
    Explorer,
    Modern,
    Legacy,
    Pauper,
    Vintage,
    Penny,
    Commander,
    Oathbreaker,
    Standardbrawl,
    Brawl,
    Alchemy,
    Paupercommander,
    Duel,
    Oldschool,
    Premodern,
    Predh,
}

impl Format {
    /// Wire order. Append only.
    pub const ALL: [Format; 22] = [
        Format::Standard,
        Format::Future,
        Format::Historic,
        Format::Timeless,
        Format::Gladiator,
        Format::Pioneer,
        Format::Explorer,
        Format::Modern,
        Format::Legacy,
        Format::Pauper,
        Format::Vintage,
        Format::Penny,
        Format::Commander,
        Format::Oathbreaker,
        Format::Standardbrawl,
        Format::Brawl,
        Format::Alchemy,
        Format::Paupercommander,
        Format::Duel,
        Format::Oldschool,
        Format::Premodern,
        Format::Predh,
    ];

    /// Lowest bit of this format's 2-bit field
    pub fn bit_offset(self) -> u32 {
        self as u32 * BITS_PER_FORMAT
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Standard => "standard",
            Format::Future => "future",
            Format::Historic => "historic",
            Format::Timeless => "timeless",
            Format::Gladiator => "gladiator",
            Format::Pioneer => "pioneer",
            Format::Explorer => "explorer",
            Format::Modern => "modern",
            Format::Legacy => "legacy",
            Format::Pauper => "pauper",
            Format::Vintage => "vintage",
            Format::Penny => "penny",
            Format::Commander => "commander",
            Format::Oathbreaker => "oathbreaker",
            Format::Standardbrawl => "standardbrawl",
            Format::Brawl => "brawl",
            Format::Alchemy => "alchemy",
            Format::Paupercommander => "paupercommander",
            Format::Duel => "duel",
            Format::Oldschool => "oldschool",
            Format::Premodern => "premodern",
            Format::Predh => "predh",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = ManaqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ManaqlError::Parse(format!("unknown format '{}'", s)))
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legality of a card in one format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalityStatus {
    #[default]
    NotLegal,
    Legal,
    Banned,
    Restricted,
}

impl LegalityStatus {
    pub fn bits(self) -> u64 {
        match self {
            LegalityStatus::NotLegal => 0,
            LegalityStatus::Legal => 1,
            LegalityStatus::Banned => 2,
            LegalityStatus::Restricted => 3,
        }
    }

    /// Every 2-bit pattern is a valid status, so this is total.
    pub fn from_bits(bits: u64) -> Self {
        match bits & STATUS_MASK {
            1 => LegalityStatus::Legal,
            2 => LegalityStatus::Banned,
            3 => LegalityStatus::Restricted,
            _ => LegalityStatus::NotLegal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegalityStatus::NotLegal => "not_legal",
            LegalityStatus::Legal => "legal",
            LegalityStatus::Banned => "banned",
            LegalityStatus::Restricted => "restricted",
        }
    }
}

impl std::str::FromStr for LegalityStatus {
    type Err = ManaqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_legal" => Ok(LegalityStatus::NotLegal),
            "legal" => Ok(LegalityStatus::Legal),
            "banned" => Ok(LegalityStatus::Banned),
            "restricted" => Ok(LegalityStatus::Restricted),
            other => Err(ManaqlError::Parse(format!("unknown legality status '{}'", other))),
        }
    }
}

impl std::fmt::Display for LegalityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All 22 format statuses packed into the low 44 bits of a `u64`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct LegalityBitmap(u64);

impl LegalityBitmap {
    /// Number of bits in use
    pub const BITS: u32 = Format::ALL.len() as u32 * BITS_PER_FORMAT;

    /// Largest valid bitmap value (2^44 - 1)
    pub const MAX: u64 = (1u64 << Self::BITS) - 1;

    /// Size of the big-endian wire representation
    pub const WIRE_LEN: usize = 6;

    /// Pack a format-name -> status-name table.
    ///
    /// Unknown format names and unknown status strings are skipped; a later
    /// entry for the same format overwrites an earlier one.
    pub fn encode<I, F, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = (F, S)>,
        F: AsRef<str>,
        S: AsRef<str>,
    {
        let mut bitmap = Self::default();
        for (format, status) in statuses {
            let (Ok(format), Ok(status)) = (
                format.as_ref().parse::<Format>(),
                status.as_ref().parse::<LegalityStatus>(),
            ) else {
                continue;
            };
            bitmap.set(format, status);
        }
        bitmap
    }

    /// Unpack into a table covering every known format.
    pub fn decode(&self) -> BTreeMap<Format, LegalityStatus> {
        Format::ALL
            .into_iter()
            .map(|format| (format, self.status(format)))
            .collect()
    }

    /// Status for a format by name; unknown names read as `not_legal`.
    pub fn get(&self, format: &str) -> LegalityStatus {
        format
            .parse::<Format>()
            .map(|format| self.status(format))
            .unwrap_or_default()
    }

    pub fn status(&self, format: Format) -> LegalityStatus {
        LegalityStatus::from_bits(self.0 >> format.bit_offset())
    }

    pub fn set(&mut self, format: Format, status: LegalityStatus) {
        let offset = format.bit_offset();
        self.0 = (self.0 & !(STATUS_MASK << offset)) | (status.bits() << offset);
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// 6-byte big-endian form used for storage
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let full = self.0.to_be_bytes();
        let mut wire = [0u8; Self::WIRE_LEN];
        wire.copy_from_slice(&full[full.len() - Self::WIRE_LEN..]);
        wire
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, LegalityError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(LegalityError::WireLength {
                expected: Self::WIRE_LEN,
                actual: bytes.len(),
            });
        }
        let mut full = [0u8; 8];
        full[8 - Self::WIRE_LEN..].copy_from_slice(bytes);
        Self::try_from(u64::from_be_bytes(full))
    }
}

impl TryFrom<u64> for LegalityBitmap {
    type Error = LegalityError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(LegalityError::TooLarge(value));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i64> for LegalityBitmap {
    type Error = LegalityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let unsigned = u64::try_from(value).map_err(|_| LegalityError::Negative(value))?;
        Self::try_from(unsigned)
    }
}

impl From<LegalityBitmap> for u64 {
    fn from(bitmap: LegalityBitmap) -> Self {
        bitmap.0
    }
}
