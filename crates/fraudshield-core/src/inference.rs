//! Boundary to the external text-generation engine

use std::path::{Path, PathBuf};

use crate::error::Result;

/// File-retrieval strategy handed to the engine so any extra file it needs
/// during initialization reuses the session's cache, validation, and
/// cancellation behavior instead of re-downloading.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn fetch(&self, url: &str) -> Result<PathBuf>;
}

/// Everything the engine needs to bring a model up.
pub struct EngineInit<'a, F: AssetSource> {
    /// Remote model identifier, e.g. `org/tiny`
    pub model_id: &'a str,
    /// Local directory holding the acquired files
    pub local_dir: &'a Path,
    /// Asset path template from the preset, joined with the variant file
    pub asset_path: &'a str,
    /// Engine options forwarded verbatim from the preset
    pub options: &'a serde_json::Map<String, serde_json::Value>,
    pub fetcher: &'a F,
}

/// The external inference engine. The core guarantees the required files
/// exist under `local_dir` before calling `init`; a non-error return means
/// the model is ready for inference. The engine's internals are not this
/// crate's concern.
#[allow(async_fn_in_trait)]
pub trait TextGenerationEngine {
    async fn init<F: AssetSource>(&mut self, init: EngineInit<'_, F>) -> Result<()>;

    /// Run generation on an initialized model and return the raw output.
    async fn generate(&mut self, prompt: &str) -> Result<String>;
}
