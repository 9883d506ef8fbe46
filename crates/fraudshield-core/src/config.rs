//! Configuration for the model acquisition subsystem

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Published catalog of model presets.
pub const DEFAULT_PRESETS_URL: &str =
    "https://raw.githubusercontent.com/lakpriya1s/llm-financial-fraud-detection/refs/heads/main/presets.json";

/// Model hub serving the file listing and resolve endpoints.
pub const DEFAULT_HUB_BASE_URL: &str = "https://huggingface.co";

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Directory holding per-preset model caches
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// URL of the preset catalog document
    #[serde(default = "default_presets_url")]
    pub presets_url: String,

    /// Base URL of the model hub
    #[serde(default = "default_hub_base_url")]
    pub hub_base_url: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            presets_url: default_presets_url(),
            hub_base_url: default_hub_base_url(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    if let Ok(from_env) = std::env::var("FRAUDSHIELD_CACHE_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fraudshield")
}

fn default_presets_url() -> String {
    DEFAULT_PRESETS_URL.to_string()
}

fn default_hub_base_url() -> String {
    DEFAULT_HUB_BASE_URL.to_string()
}

impl CoreConfig {
    /// Configuration rooted at an explicit cache directory, keeping the
    /// default remote endpoints.
    pub fn with_cache_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }
}
