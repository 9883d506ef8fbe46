//! Local cache inspection and variant deletion

use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::catalog::ModelVariant;
use crate::error::Result;
use crate::model::manifest::STRUCTURAL_FILES;

/// Read-only view of the per-preset cache directories plus the single write
/// operation that removes a variant's weight file.
///
/// There is no index file: "downloaded" is always a live filesystem
/// predicate, so concurrent readers may observe a partially written
/// directory and must simply report it as not downloaded.
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_root: PathBuf,
}

impl ModelCache {
    pub fn new(cache_root: PathBuf) -> Self {
        Self { cache_root }
    }

    /// Cache directory for one preset.
    pub fn preset_dir(&self, preset_name: &str) -> PathBuf {
        self.cache_root.join(preset_name)
    }

    /// Whether every file a variant needs is present on disk.
    ///
    /// Existence only — structural JSON is not parse-validated here, so a
    /// corrupt config can still report as downloaded. The fetch path
    /// validates and self-heals on the next acquisition; this asymmetry is
    /// deliberate, inherited behavior.
    pub fn is_variant_downloaded(&self, preset_name: &str, variant: ModelVariant) -> bool {
        let dir = self.preset_dir(preset_name);
        if !dir.exists() {
            return false;
        }
        if !dir.join(variant.file_name()).exists() {
            return false;
        }
        STRUCTURAL_FILES.iter().all(|file| dir.join(file).exists())
    }

    /// Every variant of this preset that is fully present locally. Tolerates
    /// a preset that was never downloaded.
    pub fn variants_present(&self, preset_name: &str) -> Vec<ModelVariant> {
        ModelVariant::all()
            .iter()
            .copied()
            .filter(|variant| self.is_variant_downloaded(preset_name, *variant))
            .collect()
    }

    /// Delete one variant's weight file. Idempotent: a file that is already
    /// gone is a success. Structural files are retained for reuse by other
    /// variants of the same preset; callers re-inspect the cache afterwards
    /// to refresh any "downloaded" state they hold.
    pub fn delete_variant(&self, preset_name: &str, variant: ModelVariant) -> Result<()> {
        let path = self.preset_dir(preset_name).join(variant.file_name());
        debug!("Deleting model file {:?}", path);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Error deleting model file {:?}: {}", path, e);
                Err(e.into())
            }
        }
    }
}
