//! Card vocabulary shared across ManaQL
//!
//! The string forms used here are the ones the upstream catalog feed uses, so
//! `FromStr`/`as_str` round-trip with raw records.

pub mod card_type;
pub mod legality;

pub use card_type::{classify, PrimaryType};
pub use legality::{Format, LegalityBitmap, LegalityError, LegalityStatus};

use serde::{Deserialize, Serialize};

use crate::error::ManaqlError;

/// One of the five colors of mana (WUBRG order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "W")]
    White,
    #[serde(rename = "U")]
    Blue,
    #[serde(rename = "B")]
    Black,
    #[serde(rename = "R")]
    Red,
    #[serde(rename = "G")]
    Green,
}

impl Color {
    pub const ALL: [Color; 5] = [
        Color::White,
        Color::Blue,
        Color::Black,
        Color::Red,
        Color::Green,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Color::White => "W",
            Color::Blue => "U",
            Color::Black => "B",
            Color::Red => "R",
            Color::Green => "G",
        }
    }
}

impl std::str::FromStr for Color {
    type Err = ManaqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "W" => Ok(Color::White),
            "U" => Ok(Color::Blue),
            "B" => Ok(Color::Black),
            "R" => Ok(Color::Red),
            "G" => Ok(Color::Green),
            other => Err(ManaqlError::Parse(format!("unknown color symbol '{}'", other))),
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Game environment a card is available in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Paper,
    Mtgo,
    Arena,
}

impl Game {
    pub fn as_str(&self) -> &'static str {
        match self {
            Game::Paper => "paper",
            Game::Mtgo => "mtgo",
            Game::Arena => "arena",
        }
    }
}

impl std::str::FromStr for Game {
    type Err = ManaqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(Game::Paper),
            "mtgo" => Ok(Game::Mtgo),
            "arena" => Ok(Game::Arena),
            other => Err(ManaqlError::Parse(format!("unknown game '{}'", other))),
        }
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical finish a printing is available in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finish {
    Nonfoil,
    Foil,
    Etched,
}

impl Finish {
    pub fn as_str(&self) -> &'static str {
        match self {
            Finish::Nonfoil => "nonfoil",
            Finish::Foil => "foil",
            Finish::Etched => "etched",
        }
    }
}

impl std::str::FromStr for Finish {
    type Err = ManaqlError;

    /// Finish names are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nonfoil" => Ok(Finish::Nonfoil),
            "foil" => Ok(Finish::Foil),
            "etched" => Ok(Finish::Etched),
            _ => Err(ManaqlError::Parse(format!("unknown finish '{}'", s))),
        }
    }
}

impl std::fmt::Display for Finish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
