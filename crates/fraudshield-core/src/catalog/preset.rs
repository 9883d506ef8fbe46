//! Preset catalog client with an offline fallback copy

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::CoreConfig;

/// File under the cache root holding the last successfully fetched catalog
const PRESETS_CACHE_FILE: &str = "presets.json";

/// A model preset published in the remote catalog.
///
/// Immutable once fetched; `name` is the identity and doubles as the
/// per-preset cache directory name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    pub name: String,
    /// Remote model identifier, e.g. `org/tiny`
    pub model: String,
    /// Asset path template handed to the inference engine
    pub onnx_path: String,
    /// Engine options forwarded verbatim
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Fetches the preset catalog, falling back to the last good copy on disk
/// when the network is unavailable.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    http: reqwest::Client,
    url: String,
    fallback_path: PathBuf,
}

impl PresetCatalog {
    pub fn new(http: reqwest::Client, config: &CoreConfig) -> Self {
        Self {
            http,
            url: config.presets_url.clone(),
            fallback_path: config.cache_root.join(PRESETS_CACHE_FILE),
        }
    }

    /// Fetch the catalog. Never fails: a network or parse problem falls back
    /// to the cached copy, and an empty catalog is returned when neither is
    /// available.
    pub async fn fetch(&self) -> Vec<Preset> {
        match self.fetch_remote().await {
            Ok(presets) => {
                self.write_fallback(&presets);
                presets
            }
            Err(e) => {
                warn!("Failed to fetch presets from {}: {}", self.url, e);
                self.read_fallback()
            }
        }
    }

    async fn fetch_remote(&self) -> crate::Result<Vec<Preset>> {
        let response = self.http.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::Transfer(format!(
                "HTTP {} for {}",
                response.status(),
                self.url
            )));
        }
        Ok(response.json().await?)
    }

    fn write_fallback(&self, presets: &[Preset]) {
        let write = || -> crate::Result<()> {
            if let Some(parent) = self.fallback_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.fallback_path, serde_json::to_vec(presets)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(
                "Failed to cache presets at {:?}: {}",
                self.fallback_path, e
            );
        } else {
            debug!("Cached {} presets at {:?}", presets.len(), self.fallback_path);
        }
    }

    fn read_fallback(&self) -> Vec<Preset> {
        let read = || -> crate::Result<Vec<Preset>> {
            let bytes = fs::read(&self.fallback_path)?;
            Ok(serde_json::from_slice(&bytes)?)
        };
        match read() {
            Ok(presets) => {
                debug!("Using {} cached presets", presets.len());
                presets
            }
            Err(e) => {
                warn!("No usable preset cache at {:?}: {}", self.fallback_path, e);
                Vec::new()
            }
        }
    }
}
