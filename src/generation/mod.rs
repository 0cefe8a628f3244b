//! Procedural generation core: trait layers, rarity selection, rendering.
//!
//! This is the algorithmic heart of the pipeline. [`selector`] owns the
//! weighted draws, composition rules, supply caps, and DNA uniqueness;
//! [`layers`] holds the static configuration; [`renderer`] is the seam to
//! the image-compositing collaborator.

pub mod layers;
pub mod renderer;
pub mod selector;

pub use layers::{Layer, LayerSet, SuppressionRule, TierConfig, TraitOption};
pub use renderer::{AssetRenderer, MetadataAttribute, NftMetadata, RenderOutput, SubprocessRenderer};
pub use selector::{
    SelectedTrait, SelectionOutcome, TierCounters, TierSnapshot, TraitSelector,
    UNIQUENESS_TOLERANCE, derive_tier,
};
