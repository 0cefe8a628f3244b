//! Static trait layer configuration.
//!
//! A [`LayerSet`] is loaded once at startup from a JSON file and never
//! mutated at runtime. It describes the ordered artwork layers with their
//! weighted trait options, the per-tier supply caps and base chances, and
//! the declarative suppression rules between layers.

use std::path::Path;

use serde::Deserialize;

use crate::error::ForgeError;

/// One weighted option within a layer.
///
/// Trait rarity is embedded in the identifier as a `_r<level>` suffix
/// (optionally before a file extension), e.g. `golden_crown_r1.png`.
/// Options without a marker carry no trait rarity.
#[derive(Debug, Clone, Deserialize)]
pub struct TraitOption {
    /// Trait identifier / source filename.
    pub name: String,
    /// Relative draw weight. Must be nonzero.
    pub weight: u32,
}

impl TraitOption {
    /// Parses the embedded trait rarity marker, if any.
    ///
    /// Accepts levels 1–5; anything else is treated as unmarked.
    #[must_use]
    pub fn rarity_marker(&self) -> Option<u8> {
        let stem = self.name.split('.').next().unwrap_or(&self.name);
        let (_, level) = stem.rsplit_once("_r")?;
        match level.parse::<u8>() {
            Ok(level @ 1..=5) => Some(level),
            _ => None,
        }
    }
}

/// One ordered artwork layer with its weighted options.
#[derive(Debug, Clone, Deserialize)]
pub struct Layer {
    /// Layer name, e.g. `"background"`, `"outerwear"`.
    pub name: String,
    /// Weighted trait options. Must be nonempty.
    pub options: Vec<TraitOption>,
}

impl Layer {
    /// Sum of all option weights in this layer.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.options.iter().map(|o| u64::from(o.weight)).sum()
    }
}

/// Supply cap and base probability share for one rarity tier.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TierConfig {
    /// Tier level (1–5).
    pub level: u8,
    /// Maximum number of tokens this tier may ever receive.
    pub limit: u32,
    /// Base probability share in percent. All five must sum to 100.
    pub chance: f64,
}

/// Declarative "trait X in layer A suppresses layer B" rule.
///
/// When the named trait is drawn, the suppressed layer's selection is
/// dropped from the final trait list before rendering. New rules are
/// config additions, not code changes.
#[derive(Debug, Clone, Deserialize)]
pub struct SuppressionRule {
    /// Layer the triggering trait belongs to.
    pub layer: String,
    /// Trait name that triggers suppression.
    pub trait_name: String,
    /// Layer whose selection is dropped.
    pub suppresses: String,
}

/// Complete, validated layer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSet {
    /// Ordered artwork layers, background first.
    pub layers: Vec<Layer>,
    /// Per-tier supply caps and base chances. Exactly five entries,
    /// levels 1–5.
    pub tiers: Vec<TierConfig>,
    /// Cross-layer suppression rules.
    #[serde(default)]
    pub suppressions: Vec<SuppressionRule>,
}

impl LayerSet {
    /// Loads and validates a layer set from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] if the file cannot be read,
    /// parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ForgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::Configuration(format!("cannot read layer config {}: {e}", path.display()))
        })?;
        let set: Self = serde_json::from_str(&raw).map_err(|e| {
            ForgeError::Configuration(format!("invalid layer config {}: {e}", path.display()))
        })?;
        set.validate()?;
        Ok(set)
    }

    /// Validates structural invariants of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] on empty layers, zero
    /// weights, missing tiers, or base chances that do not sum to 100.
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.layers.is_empty() {
            return Err(ForgeError::Configuration(
                "layer config must define at least one layer".to_string(),
            ));
        }
        for layer in &self.layers {
            if layer.options.is_empty() {
                return Err(ForgeError::Configuration(format!(
                    "layer '{}' has no options",
                    layer.name
                )));
            }
            if layer.options.iter().any(|o| o.weight == 0) {
                return Err(ForgeError::Configuration(format!(
                    "layer '{}' contains a zero-weight option",
                    layer.name
                )));
            }
        }

        if self.tiers.len() != 5 {
            return Err(ForgeError::Configuration(format!(
                "expected 5 tier entries, found {}",
                self.tiers.len()
            )));
        }
        for level in 1u8..=5 {
            if !self.tiers.iter().any(|t| t.level == level) {
                return Err(ForgeError::Configuration(format!(
                    "tier level {level} missing from config"
                )));
            }
        }
        let chance_sum: f64 = self.tiers.iter().map(|t| t.chance).sum();
        if (chance_sum - 100.0).abs() > 1e-6 {
            return Err(ForgeError::Configuration(format!(
                "tier chances must sum to 100, got {chance_sum}"
            )));
        }

        for rule in &self.suppressions {
            if !self.layers.iter().any(|l| l.name == rule.layer) {
                return Err(ForgeError::Configuration(format!(
                    "suppression rule references unknown layer '{}'",
                    rule.layer
                )));
            }
            if !self.layers.iter().any(|l| l.name == rule.suppresses) {
                return Err(ForgeError::Configuration(format!(
                    "suppression rule suppresses unknown layer '{}'",
                    rule.suppresses
                )));
            }
        }
        Ok(())
    }

    /// Layers whose selection must be dropped given that `trait_name` was
    /// drawn in `layer`.
    pub fn suppressed_by<'a>(
        &'a self,
        layer: &'a str,
        trait_name: &'a str,
    ) -> impl Iterator<Item = &'a str> {
        self.suppressions
            .iter()
            .filter(move |rule| rule.layer == layer && rule.trait_name == trait_name)
            .map(|rule| rule.suppresses.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;

    fn option(name: &str, weight: u32) -> TraitOption {
        TraitOption {
            name: name.to_string(),
            weight,
        }
    }

    pub(crate) fn sample_set() -> LayerSet {
        LayerSet {
            layers: vec![
                Layer {
                    name: "background".to_string(),
                    options: vec![option("meadow", 70), option("aurora_r3", 30)],
                },
                Layer {
                    name: "outerwear".to_string(),
                    options: vec![option("hoodie", 60), option("puffer_jacket_r2", 40)],
                },
                Layer {
                    name: "collar".to_string(),
                    options: vec![option("bell", 50), option("ruby_collar_r1", 50)],
                },
            ],
            tiers: vec![
                TierConfig {
                    level: 1,
                    limit: 5000,
                    chance: 50.0,
                },
                TierConfig {
                    level: 2,
                    limit: 2500,
                    chance: 25.0,
                },
                TierConfig {
                    level: 3,
                    limit: 1500,
                    chance: 15.0,
                },
                TierConfig {
                    level: 4,
                    limit: 800,
                    chance: 8.0,
                },
                TierConfig {
                    level: 5,
                    limit: 200,
                    chance: 2.0,
                },
            ],
            suppressions: vec![SuppressionRule {
                layer: "outerwear".to_string(),
                trait_name: "puffer_jacket_r2".to_string(),
                suppresses: "collar".to_string(),
            }],
        }
    }

    #[test]
    fn rarity_marker_parsed_from_suffix() {
        assert_eq!(option("golden_crown_r1.png", 1).rarity_marker(), Some(1));
        assert_eq!(option("aurora_r3", 1).rarity_marker(), Some(3));
        assert_eq!(option("meadow.png", 1).rarity_marker(), None);
        assert_eq!(option("weird_r9", 1).rarity_marker(), None);
    }

    #[test]
    fn total_weight_sums_options() {
        let set = sample_set();
        let Some(layer) = set.layers.first() else {
            panic!("sample has layers");
        };
        assert_eq!(layer.total_weight(), 100);
    }

    #[test]
    fn sample_set_validates() {
        assert!(sample_set().validate().is_ok());
    }

    #[test]
    fn zero_weight_rejected() {
        let mut set = sample_set();
        if let Some(layer) = set.layers.first_mut()
            && let Some(opt) = layer.options.first_mut()
        {
            opt.weight = 0;
        }
        assert!(set.validate().is_err());
    }

    #[test]
    fn chances_must_sum_to_100() {
        let mut set = sample_set();
        if let Some(tier) = set.tiers.first_mut() {
            tier.chance = 10.0;
        }
        assert!(set.validate().is_err());
    }

    #[test]
    fn unknown_suppressed_layer_rejected() {
        let mut set = sample_set();
        set.suppressions.push(SuppressionRule {
            layer: "outerwear".to_string(),
            trait_name: "hoodie".to_string(),
            suppresses: "hat".to_string(),
        });
        assert!(set.validate().is_err());
    }

    #[test]
    fn suppressed_by_matches_rule() {
        let set = sample_set();
        let suppressed: Vec<&str> = set.suppressed_by("outerwear", "puffer_jacket_r2").collect();
        assert_eq!(suppressed, vec!["collar"]);
        assert_eq!(set.suppressed_by("outerwear", "hoodie").count(), 0);
    }
}
