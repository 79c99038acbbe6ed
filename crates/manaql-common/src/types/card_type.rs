//! Primary card type classification
//!
//! A card's type line ("Legendary Creature — Elf Druid", "Sorcery // Land")
//! is reduced to a single coarse [`PrimaryType`] used for search facets.

use serde::{Deserialize, Serialize};

use crate::error::ManaqlError;

/// Separator between the faces of a multi-faced card's type line
pub const FACE_SEPARATOR: &str = " // ";

/// Pre-modern wording for auras ("Enchant Creature", "Enchant Land")
const LEGACY_ENCHANT_PREFIX: &str = "Enchant ";

/// Keyword search order; earlier entries win when a line names several types.
const PRIORITY: [(&str, PrimaryType); 8] = [
    ("Planeswalker", PrimaryType::Planeswalker),
    ("Battle", PrimaryType::Battle),
    ("Land", PrimaryType::Land),
    ("Creature", PrimaryType::Creature),
    ("Artifact", PrimaryType::Artifact),
    ("Enchantment", PrimaryType::Enchantment),
    ("Sorcery", PrimaryType::Sorcery),
    ("Instant", PrimaryType::Instant),
];

/// Coarse card category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimaryType {
    Artifact,
    Battle,
    Conspiracy,
    Creature,
    Dungeon,
    Enchantment,
    Instant,
    Kindred,
    Land,
    Phenomenon,
    Plane,
    Planeswalker,
    Scheme,
    Sorcery,
    Vanguard,
    #[default]
    Unknown,
}

impl PrimaryType {
    pub const ALL: [PrimaryType; 16] = [
        PrimaryType::Artifact,
        PrimaryType::Battle,
        PrimaryType::Conspiracy,
        PrimaryType::Creature,
        PrimaryType::Dungeon,
        PrimaryType::Enchantment,
        PrimaryType::Instant,
        PrimaryType::Kindred,
        PrimaryType::Land,
        PrimaryType::Phenomenon,
        PrimaryType::Plane,
        PrimaryType::Planeswalker,
        PrimaryType::Scheme,
        PrimaryType::Sorcery,
        PrimaryType::Vanguard,
        PrimaryType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimaryType::Artifact => "Artifact",
            PrimaryType::Battle => "Battle",
            PrimaryType::Conspiracy => "Conspiracy",
            PrimaryType::Creature => "Creature",
            PrimaryType::Dungeon => "Dungeon",
            PrimaryType::Enchantment => "Enchantment",
            PrimaryType::Instant => "Instant",
            PrimaryType::Kindred => "Kindred",
            PrimaryType::Land => "Land",
            PrimaryType::Phenomenon => "Phenomenon",
            PrimaryType::Plane => "Plane",
            PrimaryType::Planeswalker => "Planeswalker",
            PrimaryType::Scheme => "Scheme",
            PrimaryType::Sorcery => "Sorcery",
            PrimaryType::Vanguard => "Vanguard",
            PrimaryType::Unknown => "Unknown",
        }
    }
}

impl std::str::FromStr for PrimaryType {
    type Err = ManaqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrimaryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ManaqlError::Parse(format!("unknown primary type '{}'", s)))
    }
}

impl std::fmt::Display for PrimaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the primary type from a raw type line.
///
/// The legacy `Enchant ` prefix is checked against the whole line before the
/// line is split; keyword matching only looks at the front face.
pub fn classify(type_line: Option<&str>) -> PrimaryType {
    let line = match type_line {
        Some(line) if !line.is_empty() => line,
        _ => return PrimaryType::Unknown,
    };

    if line.starts_with(LEGACY_ENCHANT_PREFIX) {
        return PrimaryType::Enchantment;
    }

    let front = front_face(line);
    if front.starts_with(LEGACY_ENCHANT_PREFIX) {
        return PrimaryType::Enchantment;
    }

    PRIORITY
        .iter()
        .find(|(keyword, _)| front.contains(keyword))
        .map(|(_, primary)| *primary)
        .unwrap_or(PrimaryType::Unknown)
}

fn front_face(line: &str) -> &str {
    line.split(FACE_SEPARATOR).next().unwrap_or(line)
}
