//! FraudShield Core - on-device fraud-detection model management
//!
//! This crate is the model acquisition and local-cache subsystem behind the
//! FraudShield mobile UI: it fetches the preset catalog, resolves the exact
//! file set a (preset, variant) pair needs, downloads those files into a
//! per-preset cache with resume/validate/cancel semantics, and hands the
//! resulting directory to an external inference engine.
//!
//! # Example
//!
//! ```ignore
//! use fraudshield_core::{CoreConfig, ModelManager, ModelVariant};
//!
//! let manager = ModelManager::new(CoreConfig::default())?;
//! let presets = manager.catalog().fetch().await;
//!
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let outcome = manager
//!     .load_model(&presets[0], ModelVariant::Q4, &mut engine, events)
//!     .await;
//! ```

pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;

pub use catalog::{ModelVariant, Preset, PresetCatalog};
pub use classify::{classify, fraud_prompt, Classification, Verdict};
pub use config::CoreConfig;
pub use error::{Error, Result};
pub use inference::{AssetSource, EngineInit, TextGenerationEngine};
pub use model::{
    ActiveTransfer, AssetFetcher, DownloadEvent, DownloadSession, EventSender, ModelCache,
    ModelManager, SessionOutcome,
};
