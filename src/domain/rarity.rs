//! Rarity tiers for the Plumffel collection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the five ordered rarity tiers.
///
/// Serialized as its numeric level (1–5) to match the on-chain
/// `tokenRarity` representation and the frontend contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RarityTier {
    /// Tier 1 — the default outcome of a draw.
    Common,
    /// Tier 2.
    Uncommon,
    /// Tier 3.
    Rare,
    /// Tier 4.
    Epic,
    /// Tier 5 — the scarcest tier.
    Legendary,
}

impl RarityTier {
    /// All tiers in ascending order. Handy for iterating counters.
    pub const ALL: [Self; 5] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
    ];

    /// Numeric level of this tier (1–5).
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Common => 1,
            Self::Uncommon => 2,
            Self::Rare => 3,
            Self::Epic => 4,
            Self::Legendary => 5,
        }
    }

    /// Parses a numeric level (1–5) into a tier.
    #[must_use]
    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Common),
            2 => Some(Self::Uncommon),
            3 => Some(Self::Rare),
            4 => Some(Self::Epic),
            5 => Some(Self::Legendary),
            _ => None,
        }
    }

    /// Display name used in metadata attributes.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        }
    }

    /// Zero-based index into per-tier arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self.level() as usize - 1
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<RarityTier> for u8 {
    fn from(tier: RarityTier) -> Self {
        tier.level()
    }
}

impl TryFrom<u8> for RarityTier {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level).ok_or_else(|| format!("rarity level out of range: {level}"))
    }
}
