//! Cache-aware, cancellable model asset acquisition

use futures_util::StreamExt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::inference::AssetSource;
use crate::model::session::{ActiveTransfer, DownloadSession};

/// Channel the acquisition narrative is published on.
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;

/// Typed acquisition events, in emission order. The UI derives its progress
/// bar from `Progress` and its status line from `status_text`.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    SessionStarted,
    ResolvingManifest,
    /// The manifest resolved to nothing; benign end of the session.
    ManifestEmpty,
    DownloadStarted {
        total: usize,
    },
    FileStarted {
        index: usize,
        total: usize,
        file: String,
    },
    /// Byte-level completion of the current file only; resets to 0 between
    /// files rather than blending across the session.
    Progress {
        fraction: f32,
    },
    FileCompleted {
        index: usize,
        total: usize,
        file: String,
        /// Satisfied from the local cache without a network transfer.
        cached: bool,
    },
    EngineLoading,
    SessionCompleted,
    SessionCancelled,
    SessionFailed {
        message: String,
    },
}

impl DownloadEvent {
    /// Status line shown to the user, if this event carries one.
    pub fn status_text(&self) -> Option<String> {
        match self {
            Self::SessionStarted => Some("Initializing...".into()),
            Self::ResolvingManifest => Some("Checking model files...".into()),
            Self::ManifestEmpty => Some("Required files not found".into()),
            Self::DownloadStarted { .. } => Some("Downloading model files...".into()),
            Self::FileStarted { index, total, .. } => {
                Some(format!("Downloading file {index}/{total}..."))
            }
            Self::Progress { .. } => None,
            Self::FileCompleted {
                index,
                total,
                cached: true,
                ..
            } => Some(format!("File {index}/{total} already downloaded")),
            Self::FileCompleted { index, total, .. } => {
                Some(format!("File {index}/{total} downloaded successfully"))
            }
            Self::EngineLoading => Some("Loading model...".into()),
            Self::SessionCompleted => Some("Model loaded successfully".into()),
            Self::SessionCancelled => Some("Download cancelled".into()),
            Self::SessionFailed { message } => Some(format!("Error: {message}")),
        }
    }
}

/// Per-acquisition fetcher: downloads each required file into the preset's
/// cache directory, skipping files that are already present and valid.
///
/// The same value doubles as the inference engine's file-retrieval strategy,
/// so any extra file the engine requests during initialization flows through
/// the identical skip/validate/cancel path.
pub struct AssetFetcher {
    http: reqwest::Client,
    cache_root: PathBuf,
    preset_name: String,
    session: Arc<DownloadSession>,
    events: EventSender,
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl AssetFetcher {
    pub fn new(
        http: reqwest::Client,
        cache_root: PathBuf,
        preset_name: impl Into<String>,
        session: Arc<DownloadSession>,
        events: EventSender,
    ) -> Self {
        Self {
            http,
            cache_root,
            preset_name: preset_name.into(),
            session,
            events,
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// Number of files the session expects; the denominator of the
    /// "File k/N" narrative. Engine-requested extras can exceed it, in which
    /// case the denominator stretches.
    pub fn set_expected_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn completed_files(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// The preset's local cache directory.
    pub fn local_dir(&self) -> PathBuf {
        self.cache_root.join(&self.preset_name)
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.events.send(event);
    }

    /// Fetch every file in `files`, in order, from the hub's resolve
    /// endpoint. Stops at the first failure or cancellation.
    pub async fn fetch_all(
        &self,
        hub_base_url: &str,
        model_id: &str,
        files: &[String],
    ) -> Result<()> {
        for file in files {
            self.session.check()?;
            let url = format!("{hub_base_url}/{model_id}/resolve/main/{file}");
            self.fetch_with_cache(&url).await?;
        }
        Ok(())
    }

    /// Fetch one file unless a valid copy already exists locally.
    ///
    /// A present JSON file is parse-validated first; a corrupt copy is
    /// deleted and re-fetched (silent self-heal). A valid local copy is
    /// counted as satisfied without any network transfer — a previously
    /// completed file is never re-fetched.
    pub async fn fetch_with_cache(&self, url: &str) -> Result<PathBuf> {
        let local_dir = self.local_dir();
        if !local_dir.exists() {
            fs::create_dir_all(&local_dir)?;
        }

        let file_name = url.rsplit('/').next().unwrap_or(url).to_string();
        let local_path = local_dir.join(&file_name);

        if self.validated_local_copy(&local_path, &file_name)? {
            info!("File exists locally: {:?}", local_path);
            let index = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
            let total = self.total.load(Ordering::SeqCst).max(index);
            self.emit(DownloadEvent::FileCompleted {
                index,
                total,
                file: file_name,
                cached: true,
            });
            return Ok(local_path);
        }

        // Cancellation must take effect before any new transfer begins.
        self.session.check()?;

        let index = self.completed.load(Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst).max(index);
        self.emit(DownloadEvent::FileStarted {
            index,
            total,
            file: file_name.clone(),
        });
        debug!("Downloading {}", url);

        self.session.set_active(ActiveTransfer {
            url: url.to_string(),
            local_path: local_path.clone(),
        });
        let transferred = self.transfer(url, &local_path).await;
        self.session.clear_active();

        match transferred {
            Ok(()) => {
                if self.session.is_cancelled() {
                    // Bytes landed, but the session was cancelled mid-flight:
                    // discard the success. The file stays for a later resume.
                    debug!("Download cancelled after file completed: {}", url);
                    return Err(Error::Cancelled);
                }
                let index = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst).max(index);
                self.emit(DownloadEvent::Progress { fraction: 0.0 });
                self.emit(DownloadEvent::FileCompleted {
                    index,
                    total,
                    file: file_name,
                    cached: false,
                });
                Ok(local_path)
            }
            // Pause, not destroy: a cancelled transfer keeps its partial
            // file so a later session can pick the path back up.
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                let _ = fs::remove_file(&local_path);
                Err(e)
            }
        }
    }

    /// Whether a usable local copy exists, deleting corrupt JSON on the way.
    fn validated_local_copy(&self, local_path: &Path, file_name: &str) -> Result<bool> {
        if !local_path.exists() {
            return Ok(false);
        }
        if file_name.ends_with(".json") {
            let parsed = fs::read_to_string(local_path)
                .map_err(Error::from)
                .and_then(|content| {
                    serde_json::from_str::<serde_json::Value>(&content).map_err(Error::from)
                });
            if let Err(e) = parsed {
                warn!("Invalid JSON in {:?}, deleting: {}", local_path, e);
                fs::remove_file(local_path)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stream one file to disk, publishing per-chunk progress and racing the
    /// session's abort signal at every read.
    async fn transfer(&self, url: &str, local_path: &Path) -> Result<()> {
        let response = tokio::select! {
            response = self.http.get(url).send() => response?,
            _ = self.session.aborted() => return Err(Error::Cancelled),
        };

        if !response.status().is_success() {
            return Err(Error::Transfer(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let expected = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = File::create(local_path)?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = self.session.aborted() => return Err(Error::Cancelled),
            };
            let Some(chunk) = chunk else { break };
            let chunk =
                chunk.map_err(|e| Error::Transfer(format!("Error downloading {url}: {e}")))?;
            file.write_all(&chunk)?;
            written += chunk.len() as u64;

            let fraction = match expected {
                Some(total) if total > 0 => written as f32 / total as f32,
                _ => 0.0,
            };
            self.emit(DownloadEvent::Progress { fraction });
        }

        file.sync_all()?;
        debug!("Downloaded {} bytes to {:?}", written, local_path);
        Ok(())
    }
}

impl AssetSource for AssetFetcher {
    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        self.fetch_with_cache(url).await
    }
}
