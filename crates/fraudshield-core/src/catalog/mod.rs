//! Preset catalog and model variant metadata.
//!
//! This module is the canonical place for the remote preset catalog, its
//! offline fallback, and the fixed set of weight-file variants a preset can
//! ship.

mod preset;
mod variant;

pub use preset::{Preset, PresetCatalog};
pub use variant::ModelVariant;
