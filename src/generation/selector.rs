//! Weighted trait selection and rarity-tier derivation.
//!
//! The selector draws one option per layer by weighted random, counts the
//! special-marked trait rarities in the draw, derives the overall tier from
//! the composition rule table, and accepts the draw only if the tier still
//! has supply and the DNA has not been seen this run. Rejected draws are
//! retried up to [`UNIQUENESS_TOLERANCE`] times, then generation aborts
//! loudly.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;

use super::layers::{LayerSet, TierConfig};
use crate::domain::RarityTier;
use crate::error::ForgeError;

/// Upper bound on rejected draws (cap hits, uniqueness collisions, or
/// target-tier mismatches) before a selection call gives up. Exceeding it
/// means the layer set cannot produce enough unique, compliant
/// combinations — a capacity problem, not a transient one.
pub const UNIQUENESS_TOLERANCE: u32 = 10_000;

/// Point-in-time view of one tier's counters.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TierSnapshot {
    /// Tier level (1–5).
    pub level: u8,
    /// Supply cap.
    pub limit: u32,
    /// Accepted draws so far.
    pub generated: u32,
    /// Current probability share in percent (0 when exhausted).
    pub current_chance: f64,
}

#[derive(Debug, Clone, Copy)]
struct TierState {
    limit: u32,
    generated: u32,
    chance: f64,
}

impl TierState {
    const fn is_exhausted(&self) -> bool {
        self.generated >= self.limit
    }
}

/// Process-wide per-tier supply counters with probability rebalancing.
///
/// The check-then-increment in [`Self::try_accept`] runs under a single
/// mutex so concurrent draws for the same tier can never exceed its limit.
/// The lock is synchronous and never held across an await point.
#[derive(Debug)]
pub struct TierCounters {
    inner: Mutex<[TierState; 5]>,
}

impl TierCounters {
    /// Builds counters from the five validated tier configs.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] if any of the five levels is
    /// missing.
    pub fn new(configs: &[TierConfig]) -> Result<Self, ForgeError> {
        let mut states = [TierState {
            limit: 0,
            generated: 0,
            chance: 0.0,
        }; 5];
        for tier in RarityTier::ALL {
            let config = configs
                .iter()
                .find(|c| c.level == tier.level())
                .ok_or_else(|| {
                    ForgeError::Configuration(format!("tier level {} missing", tier.level()))
                })?;
            if let Some(state) = states.get_mut(tier.index()) {
                *state = TierState {
                    limit: config.limit,
                    generated: 0,
                    chance: config.chance,
                };
            }
        }
        let counters = Self {
            inner: Mutex::new(states),
        };
        // A tier configured with limit 0 starts exhausted; fold its share
        // into the open tiers right away.
        counters.rebalance();
        Ok(counters)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, [TierState; 5]> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically checks the cap for `tier` and consumes one unit of it.
    ///
    /// Returns `false` without incrementing when the tier is at its
    /// limit. When the accepted draw newly exhausts the tier, chances are
    /// rebalanced in the same critical section.
    pub fn try_accept(&self, tier: RarityTier) -> bool {
        let mut states = self.lock();
        let Some(state) = states.get_mut(tier.index()) else {
            return false;
        };
        if state.is_exhausted() {
            return false;
        }
        state.generated += 1;
        if state.is_exhausted() {
            rebalance_states(&mut states);
        }
        true
    }

    /// Redistributes probability mass away from exhausted tiers.
    ///
    /// Each exhausted tier's share moves proportionally onto the still-open
    /// tiers, preserving the 100-point total; exhausted tiers are pinned
    /// to 0. Safe to call at any time; a no-op when nothing changed.
    pub fn rebalance(&self) {
        let mut states = self.lock();
        rebalance_states(&mut states);
    }

    /// Chance-table-driven rarity pick for mints without a trait draw.
    ///
    /// `roll` must be uniform in `[0, 100)`. Only tiers with nonzero
    /// current chance can be selected. Returns `None` when every tier is
    /// exhausted.
    #[must_use]
    pub fn select_by_chance(&self, roll: f64) -> Option<RarityTier> {
        let states = self.lock();
        let mut remaining = roll;
        let mut last_open = None;
        for tier in RarityTier::ALL {
            let Some(state) = states.get(tier.index()) else {
                continue;
            };
            if state.chance <= 0.0 {
                continue;
            }
            last_open = Some(tier);
            remaining -= state.chance;
            if remaining < 0.0 {
                return Some(tier);
            }
        }
        // Floating-point residue on a roll close to 100.
        last_open
    }

    /// Snapshot of all five tiers for the stats endpoint and tests.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TierSnapshot> {
        let states = self.lock();
        RarityTier::ALL
            .iter()
            .filter_map(|tier| {
                states.get(tier.index()).map(|state| TierSnapshot {
                    level: tier.level(),
                    limit: state.limit,
                    generated: state.generated,
                    current_chance: state.chance,
                })
            })
            .collect()
    }
}

fn rebalance_states(states: &mut [TierState; 5]) {
    let exhausted_share: f64 = states
        .iter()
        .filter(|s| s.is_exhausted())
        .map(|s| s.chance)
        .sum();
    if exhausted_share <= 0.0 {
        return;
    }
    let open_sum: f64 = states
        .iter()
        .filter(|s| !s.is_exhausted())
        .map(|s| s.chance)
        .sum();
    for state in states.iter_mut() {
        if state.is_exhausted() {
            state.chance = 0.0;
        } else if open_sum > 0.0 {
            state.chance += state.chance / open_sum * exhausted_share;
        }
    }
}

/// One drawn trait in the final selection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SelectedTrait {
    /// Layer the trait belongs to.
    pub layer: String,
    /// Trait identifier as configured.
    pub trait_name: String,
}

/// Result of one accepted draw.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// Final trait list, post-suppression, in layer order.
    pub traits: Vec<SelectedTrait>,
    /// Serialized trait combination used for uniqueness checks.
    pub dna: String,
    /// Derived (or matched) rarity tier; one unit of its cap is consumed.
    pub tier: RarityTier,
}

/// Counts of special-marked trait rarities in one draw, by level 1–5.
type RarityCounts = [u32; 5];

fn count_at(counts: &RarityCounts, level: u8) -> u32 {
    counts
        .get(usize::from(level).saturating_sub(1))
        .copied()
        .unwrap_or(0)
}

/// Derives the overall NFT tier from per-trait rarity counts.
///
/// Fixed composition policy, evaluated highest tier first. The table is
/// collection policy as shipped — tier 3 keys off level-1/level-2 counts
/// while tier 2 keys off level-3 counts with a different threshold. Do not
/// "fix" the overlap without product sign-off.
#[must_use]
pub fn derive_tier(counts: &RarityCounts) -> RarityTier {
    let r1 = count_at(counts, 1);
    let r2 = count_at(counts, 2);
    let r3 = count_at(counts, 3);

    if r1 >= 1 && (r2 >= 2 || r3 >= 2) {
        RarityTier::Legendary
    } else if r1 >= 1 && r2 >= 1 {
        RarityTier::Epic
    } else if r1 >= 1 || r2 >= 2 {
        RarityTier::Rare
    } else if r2 >= 1 || r3 >= 3 {
        RarityTier::Uncommon
    } else {
        RarityTier::Common
    }
}

/// Deterministically-random trait selector with supply caps and DNA
/// uniqueness, shared by all in-flight jobs.
#[derive(Debug)]
pub struct TraitSelector {
    layers: Arc<LayerSet>,
    counters: Arc<TierCounters>,
    seen_dna: Mutex<HashSet<String>>,
}

impl TraitSelector {
    /// Creates a selector over a validated layer set.
    #[must_use]
    pub fn new(layers: Arc<LayerSet>, counters: Arc<TierCounters>) -> Self {
        Self {
            layers,
            counters,
            seen_dna: Mutex::new(HashSet::new()),
        }
    }

    /// Shared tier counters (also consumed by the fallback rarity draw).
    #[must_use]
    pub fn counters(&self) -> &Arc<TierCounters> {
        &self.counters
    }

    /// Draws a combination and derives its tier from the traits.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::GenerationExhausted`] after
    /// [`UNIQUENESS_TOLERANCE`] rejected draws.
    pub fn select(&self, rng: &mut impl Rng) -> Result<SelectionOutcome, ForgeError> {
        self.select_inner(rng, None)
    }

    /// Draws combinations until one derives exactly `target`.
    ///
    /// Used when the job's tier was fixed at creation (on-chain rarity or
    /// fallback assignment) and the artwork must match it.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::GenerationExhausted`] after
    /// [`UNIQUENESS_TOLERANCE`] rejected draws.
    pub fn select_for_tier(
        &self,
        target: RarityTier,
        rng: &mut impl Rng,
    ) -> Result<SelectionOutcome, ForgeError> {
        self.select_inner(rng, Some(target))
    }

    fn select_inner(
        &self,
        rng: &mut impl Rng,
        target: Option<RarityTier>,
    ) -> Result<SelectionOutcome, ForgeError> {
        let mut last_reason = "no draw attempted";
        for _attempt in 0..UNIQUENESS_TOLERANCE {
            let (traits, counts) = self.draw_once(rng);
            let tier = derive_tier(&counts);

            if let Some(target) = target
                && tier != target
            {
                last_reason = "derived tier did not match the job's tier";
                continue;
            }

            let dna = dna_of(&traits);
            {
                // Insert-as-test: reserving the DNA in the same critical
                // section as the collision check, so two parallel draws
                // of the same combination can never both pass.
                let mut seen = self.seen_dna.lock().unwrap_or_else(PoisonError::into_inner);
                if !seen.insert(dna.clone()) {
                    last_reason = "DNA collision";
                    continue;
                }
            }

            if !self.counters.try_accept(tier) {
                // Release the reservation; the combination stays
                // available for a draw that derives an open tier.
                self.seen_dna
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&dna);
                last_reason = "tier supply cap reached";
                continue;
            }

            let final_traits = self.apply_suppressions(traits);
            return Ok(SelectionOutcome {
                traits: final_traits,
                dna,
                tier,
            });
        }

        Err(ForgeError::GenerationExhausted {
            attempts: UNIQUENESS_TOLERANCE,
            reason: last_reason.to_string(),
        })
    }

    /// One independent weighted draw per layer, plus the per-level counts
    /// of special-marked traits in the draw.
    fn draw_once(&self, rng: &mut impl Rng) -> (Vec<SelectedTrait>, RarityCounts) {
        let mut traits = Vec::with_capacity(self.layers.layers.len());
        let mut counts: RarityCounts = [0; 5];

        for layer in &self.layers.layers {
            let total = layer.total_weight();
            if total == 0 {
                continue;
            }
            // Uniform in [0, total); subtract weights in order until the
            // remainder goes negative.
            let mut remainder = i64::try_from(rng.gen_range(0..total)).unwrap_or(0);
            for option in &layer.options {
                remainder -= i64::from(option.weight);
                if remainder < 0 {
                    if let Some(level) = option.rarity_marker()
                        && let Some(count) = counts.get_mut(usize::from(level) - 1)
                    {
                        *count += 1;
                    }
                    traits.push(SelectedTrait {
                        layer: layer.name.clone(),
                        trait_name: option.name.clone(),
                    });
                    break;
                }
            }
        }
        (traits, counts)
    }

    /// Drops selections from layers suppressed by a drawn trait.
    fn apply_suppressions(&self, traits: Vec<SelectedTrait>) -> Vec<SelectedTrait> {
        let suppressed: HashSet<String> = traits
            .iter()
            .flat_map(|t| {
                self.layers
                    .suppressed_by(&t.layer, &t.trait_name)
                    .map(str::to_string)
            })
            .collect();
        if suppressed.is_empty() {
            return traits;
        }
        traits
            .into_iter()
            .filter(|t| !suppressed.contains(&t.layer))
            .collect()
    }
}

/// Serializes a full trait selection into its DNA string.
fn dna_of(traits: &[SelectedTrait]) -> String {
    traits
        .iter()
        .map(|t| format!("{}={}", t.layer, t.trait_name))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::generation::layers::tests::sample_set;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn make_selector(set: LayerSet) -> TraitSelector {
        let counters = TierCounters::new(&set.tiers).unwrap_or_else(|_| panic!("valid tiers"));
        TraitSelector::new(Arc::new(set), Arc::new(counters))
    }

    fn counts(r1: u32, r2: u32, r3: u32) -> RarityCounts {
        [r1, r2, r3, 0, 0]
    }

    #[test]
    fn legendary_from_one_level1_and_two_level2() {
        assert_eq!(derive_tier(&counts(1, 2, 0)), RarityTier::Legendary);
        assert_eq!(derive_tier(&counts(1, 0, 2)), RarityTier::Legendary);
    }

    #[test]
    fn epic_from_level1_plus_level2() {
        assert_eq!(derive_tier(&counts(1, 1, 0)), RarityTier::Epic);
    }

    #[test]
    fn rare_from_lone_level1_or_double_level2() {
        assert_eq!(derive_tier(&counts(1, 0, 0)), RarityTier::Rare);
        assert_eq!(derive_tier(&counts(0, 2, 0)), RarityTier::Rare);
    }

    #[test]
    fn uncommon_from_level2_or_triple_level3() {
        assert_eq!(derive_tier(&counts(0, 1, 0)), RarityTier::Uncommon);
        assert_eq!(derive_tier(&counts(0, 0, 3)), RarityTier::Uncommon);
    }

    #[test]
    fn common_is_the_default() {
        assert_eq!(derive_tier(&counts(0, 0, 0)), RarityTier::Common);
        assert_eq!(derive_tier(&counts(0, 0, 2)), RarityTier::Common);
    }

    #[test]
    fn cap_never_exceeded() {
        let mut configs = sample_set().tiers;
        for tier in &mut configs {
            tier.limit = 3;
        }
        let counters = TierCounters::new(&configs).unwrap_or_else(|_| panic!("valid tiers"));
        let mut accepted = 0;
        for _ in 0..10 {
            if counters.try_accept(RarityTier::Rare) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);
        let snapshot = counters.snapshot();
        for tier in snapshot {
            assert!(tier.generated <= tier.limit);
        }
    }

    #[test]
    fn rebalance_conserves_total_and_zeroes_exhausted() {
        let mut configs = sample_set().tiers;
        if let Some(legendary) = configs.iter_mut().find(|t| t.level == 5) {
            legendary.limit = 1;
        }
        let counters = TierCounters::new(&configs).unwrap_or_else(|_| panic!("valid tiers"));
        assert!(counters.try_accept(RarityTier::Legendary));

        let snapshot = counters.snapshot();
        let open_sum: f64 = snapshot
            .iter()
            .filter(|t| t.generated < t.limit)
            .map(|t| t.current_chance)
            .sum();
        assert!((open_sum - 100.0).abs() < 1e-9, "open sum was {open_sum}");
        let legendary = snapshot.iter().find(|t| t.level == 5);
        assert_eq!(legendary.map(|t| t.current_chance), Some(0.0));
    }

    #[test]
    fn zero_limit_tier_starts_with_zero_chance() {
        let mut configs = sample_set().tiers;
        if let Some(legendary) = configs.iter_mut().find(|t| t.level == 5) {
            legendary.limit = 0;
        }
        let counters = TierCounters::new(&configs).unwrap_or_else(|_| panic!("valid tiers"));
        let snapshot = counters.snapshot();
        let legendary = snapshot.iter().find(|t| t.level == 5);
        assert_eq!(legendary.map(|t| t.current_chance), Some(0.0));
        assert!(!counters.try_accept(RarityTier::Legendary));
    }

    #[test]
    fn select_by_chance_skips_exhausted_tiers() {
        let mut configs = sample_set().tiers;
        if let Some(common) = configs.iter_mut().find(|t| t.level == 1) {
            common.limit = 0;
        }
        let counters = TierCounters::new(&configs).unwrap_or_else(|_| panic!("valid tiers"));
        for roll in [0.0, 10.0, 49.9, 99.9] {
            let tier = counters.select_by_chance(roll);
            assert_ne!(tier, Some(RarityTier::Common), "roll {roll}");
            assert!(tier.is_some());
        }
    }

    #[test]
    fn select_by_chance_none_when_all_exhausted() {
        let mut configs = sample_set().tiers;
        for tier in &mut configs {
            tier.limit = 0;
        }
        let counters = TierCounters::new(&configs).unwrap_or_else(|_| panic!("valid tiers"));
        assert_eq!(counters.select_by_chance(50.0), None);
    }

    #[test]
    fn draw_respects_weight_bounds() {
        let selector = make_selector(sample_set());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (traits, _) = selector.draw_once(&mut rng);
            // Every layer produced exactly one selection.
            assert_eq!(traits.len(), 3);
        }
    }

    #[test]
    fn dna_is_unique_across_accepted_draws() {
        let selector = make_selector(sample_set());
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = HashSet::new();
        // The sample set has 2*2*2 = 8 combinations; caps are generous,
        // so uniqueness is the only constraint in play for a few draws.
        for _ in 0..4 {
            let outcome = selector.select(&mut rng);
            let Ok(outcome) = outcome else {
                panic!("selection failed");
            };
            assert!(seen.insert(outcome.dna), "duplicate DNA");
        }
    }

    #[test]
    fn exhausted_combinations_abort_loudly() {
        // One single-option layer → exactly one possible DNA; the second
        // call must exhaust its retries and abort.
        let mut set = sample_set();
        set.layers = vec![super::super::layers::Layer {
            name: "background".to_string(),
            options: vec![super::super::layers::TraitOption {
                name: "meadow".to_string(),
                weight: 1,
            }],
        }];
        let selector = make_selector(set);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(selector.select(&mut rng).is_ok());
        let second = selector.select(&mut rng);
        assert!(matches!(
            second,
            Err(ForgeError::GenerationExhausted { .. })
        ));
    }

    #[test]
    fn capped_tier_rejects_matching_draws() {
        // Pin the Rare cap to 0: draws deriving Rare are rejected and the
        // selector falls through to combinations of other tiers.
        let mut set = sample_set();
        if let Some(rare) = set.tiers.iter_mut().find(|t| t.level == 3) {
            rare.limit = 0;
        }
        let selector = make_selector(set);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..6 {
            if let Ok(outcome) = selector.select(&mut rng) {
                assert_ne!(outcome.tier, RarityTier::Rare);
            }
        }
    }

    #[test]
    fn cap_rejection_releases_the_dna() {
        let mut set = sample_set();
        if let Some(rare) = set.tiers.iter_mut().find(|t| t.level == 3) {
            rare.limit = 0;
        }
        let selector = make_selector(set);
        let mut rng = StdRng::seed_from_u64(23);
        let mut accepted = 0;
        for _ in 0..6 {
            if selector.select(&mut rng).is_ok() {
                accepted += 1;
            }
        }
        // Only accepted combinations keep a DNA reservation;
        // cap-rejected draws put theirs back.
        let seen = selector.seen_dna.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(seen.len(), accepted);
    }

    #[test]
    fn parallel_draws_yield_unique_dna() {
        // The sample set has exactly eight combinations; eight threads
        // drawing in parallel must end up with eight distinct DNAs.
        let selector = Arc::new(make_selector(sample_set()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let selector = Arc::clone(&selector);
            handles.push(std::thread::spawn(move || {
                let mut rng = rand::thread_rng();
                selector.select(&mut rng)
            }));
        }
        let mut dnas = std::collections::HashSet::new();
        for handle in handles {
            let Ok(Ok(outcome)) = handle.join() else {
                panic!("selection thread failed");
            };
            assert!(dnas.insert(outcome.dna));
        }
        assert_eq!(dnas.len(), 8);
    }

    #[test]
    fn select_for_tier_matches_target() {
        let selector = make_selector(sample_set());
        let mut rng = StdRng::seed_from_u64(13);
        let outcome = selector.select_for_tier(RarityTier::Common, &mut rng);
        let Ok(outcome) = outcome else {
            panic!("targeted selection failed");
        };
        assert_eq!(outcome.tier, RarityTier::Common);
    }

    #[test]
    fn accepted_draw_consumes_tier_supply() {
        let selector = make_selector(sample_set());
        let mut rng = StdRng::seed_from_u64(17);
        let outcome = selector.select(&mut rng);
        let Ok(outcome) = outcome else {
            panic!("selection failed");
        };
        let snapshot = selector.counters().snapshot();
        let consumed = snapshot.iter().find(|t| t.level == outcome.tier.level());
        assert_eq!(consumed.map(|t| t.generated), Some(1));
    }

    #[test]
    fn jacket_suppresses_collar() {
        let set = sample_set();
        let counters = TierCounters::new(&set.tiers).unwrap_or_else(|_| panic!("valid tiers"));
        let selector = TraitSelector::new(Arc::new(set), Arc::new(counters));

        let traits = vec![
            SelectedTrait {
                layer: "background".to_string(),
                trait_name: "meadow".to_string(),
            },
            SelectedTrait {
                layer: "outerwear".to_string(),
                trait_name: "puffer_jacket_r2".to_string(),
            },
            SelectedTrait {
                layer: "collar".to_string(),
                trait_name: "bell".to_string(),
            },
        ];
        let final_traits = selector.apply_suppressions(traits);
        assert_eq!(final_traits.len(), 2);
        assert!(!final_traits.iter().any(|t| t.layer == "collar"));
    }

    #[test]
    fn dna_encodes_layers_and_traits() {
        let traits = vec![
            SelectedTrait {
                layer: "background".to_string(),
                trait_name: "meadow".to_string(),
            },
            SelectedTrait {
                layer: "collar".to_string(),
                trait_name: "bell".to_string(),
            },
        ];
        assert_eq!(dna_of(&traits), "background=meadow/collar=bell");
    }
}
