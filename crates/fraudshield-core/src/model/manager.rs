//! Acquisition orchestration

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::catalog::{ModelVariant, Preset, PresetCatalog};
use crate::config::CoreConfig;
use crate::error::Result;
use crate::inference::{EngineInit, TextGenerationEngine};
use crate::model::cache::ModelCache;
use crate::model::download::{AssetFetcher, DownloadEvent, EventSender};
use crate::model::manifest;
use crate::model::session::DownloadSession;

/// How an acquisition session ended. Cancellation is a normal exit, not a
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All files acquired and the engine initialized.
    Completed,
    /// The manifest resolved to nothing; no transfer was attempted.
    NothingToDownload,
    Cancelled,
    Failed(String),
}

/// Owns the single download session and ties catalog, manifest resolution,
/// the fetch engine, and the inference-engine boundary together.
pub struct ModelManager {
    config: CoreConfig,
    http: reqwest::Client,
    session: Arc<DownloadSession>,
    cache: ModelCache,
    catalog: PresetCatalog,
}

impl ModelManager {
    pub fn new(config: CoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_root)?;
        let http = reqwest::Client::builder()
            .user_agent("fraudshield/0.1.0")
            .build()?;
        let cache = ModelCache::new(config.cache_root.clone());
        let catalog = PresetCatalog::new(http.clone(), &config);
        Ok(Self {
            config,
            http,
            session: Arc::new(DownloadSession::new()),
            cache,
            catalog,
        })
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn session(&self) -> &DownloadSession {
        &self.session
    }

    /// Variants of a preset that are fully present locally.
    pub fn variants_present(&self, preset_name: &str) -> Vec<ModelVariant> {
        self.cache.variants_present(preset_name)
    }

    /// Remove one downloaded variant; see [`ModelCache::delete_variant`].
    pub fn delete_variant(&self, preset_name: &str, variant: ModelVariant) -> Result<()> {
        self.cache.delete_variant(preset_name, variant)
    }

    /// Cancel the active acquisition and wait for in-flight operations to
    /// observe it.
    pub async fn cancel(&self) {
        self.session.cancel().await;
    }

    /// Hard reset, for when an orderly cancel is not possible.
    pub fn reset(&self) {
        self.session.reset();
    }

    /// Acquire everything a (preset, variant) pair needs, then initialize
    /// the inference engine over the local directory.
    ///
    /// The full narrative is published on `events`; the return value is the
    /// session verdict. Every failure path leaves the system ready for a
    /// fresh acquisition.
    pub async fn load_model<E: TextGenerationEngine>(
        &self,
        preset: &Preset,
        variant: ModelVariant,
        engine: &mut E,
        events: EventSender,
    ) -> SessionOutcome {
        let emit = |event: DownloadEvent| {
            let _ = events.send(event);
        };

        info!("Loading model {} ({})", preset.name, variant.file_name());
        emit(DownloadEvent::SessionStarted);
        self.session.begin();

        let variant_file = variant.file_name();

        emit(DownloadEvent::ResolvingManifest);
        let files = match manifest::required_files(
            &self.http,
            &self.config.hub_base_url,
            &preset.model,
            variant_file,
            &self.session,
        )
        .await
        {
            Ok(files) => files,
            Err(_) => {
                emit(DownloadEvent::SessionCancelled);
                return SessionOutcome::Cancelled;
            }
        };

        if self.session.is_cancelled() {
            emit(DownloadEvent::SessionCancelled);
            return SessionOutcome::Cancelled;
        }

        if files.is_empty() {
            warn!(
                "No required files found for {} with format {}",
                preset.model, variant_file
            );
            emit(DownloadEvent::Progress { fraction: 1.0 });
            emit(DownloadEvent::ManifestEmpty);
            return SessionOutcome::NothingToDownload;
        }

        let fetcher = AssetFetcher::new(
            self.http.clone(),
            self.config.cache_root.clone(),
            preset.name.clone(),
            Arc::clone(&self.session),
            events.clone(),
        );
        fetcher.set_expected_total(files.len());

        emit(DownloadEvent::DownloadStarted { total: files.len() });
        match fetcher
            .fetch_all(&self.config.hub_base_url, &preset.model, &files)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                info!("Download cancelled for {}", preset.name);
                emit(DownloadEvent::SessionCancelled);
                return SessionOutcome::Cancelled;
            }
            Err(e) => {
                error!("Error loading model {}: {}", preset.name, e);
                let message = e.to_string();
                emit(DownloadEvent::SessionFailed {
                    message: message.clone(),
                });
                return SessionOutcome::Failed(message);
            }
        }

        if self.session.is_cancelled() {
            emit(DownloadEvent::SessionCancelled);
            return SessionOutcome::Cancelled;
        }

        emit(DownloadEvent::EngineLoading);
        let local_dir = self.cache.preset_dir(&preset.name);
        let asset_path = format!("{}/{}", preset.onnx_path, variant_file);
        let init = EngineInit {
            model_id: &preset.model,
            local_dir: &local_dir,
            asset_path: &asset_path,
            options: &preset.options,
            fetcher: &fetcher,
        };
        match engine.init(init).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() || self.session.is_cancelled() => {
                info!("Model loading cancelled for {}", preset.name);
                emit(DownloadEvent::SessionCancelled);
                return SessionOutcome::Cancelled;
            }
            Err(e) => {
                error!("Error loading model {}: {}", preset.name, e);
                let message = e.to_string();
                emit(DownloadEvent::SessionFailed {
                    message: message.clone(),
                });
                return SessionOutcome::Failed(message);
            }
        }

        if self.session.is_cancelled() {
            emit(DownloadEvent::SessionCancelled);
            return SessionOutcome::Cancelled;
        }

        emit(DownloadEvent::Progress { fraction: 1.0 });
        emit(DownloadEvent::SessionCompleted);
        info!("Model {} loaded successfully", preset.name);
        SessionOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::inference::AssetSource;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct MockEngine {
        inits: usize,
        fail: bool,
        seen_asset_path: Option<String>,
        extra_url: Option<String>,
    }

    impl MockEngine {
        fn new() -> Self {
            Self {
                inits: 0,
                fail: false,
                seen_asset_path: None,
                extra_url: None,
            }
        }
    }

    impl TextGenerationEngine for MockEngine {
        async fn init<F: AssetSource>(&mut self, init: EngineInit<'_, F>) -> Result<()> {
            self.inits += 1;
            self.seen_asset_path = Some(init.asset_path.to_string());
            if self.fail {
                return Err(Error::Engine("init failed".into()));
            }
            if let Some(url) = &self.extra_url {
                init.fetcher.fetch(url).await?;
            }
            Ok(())
        }

        async fn generate(&mut self, _prompt: &str) -> Result<String> {
            Ok("No".into())
        }
    }

    fn preset() -> Preset {
        Preset {
            name: "tiny".into(),
            model: "org/tiny".into(),
            onnx_path: "dir".into(),
            options: serde_json::Map::new(),
        }
    }

    fn manager(root: &std::path::Path, hub: String) -> ModelManager {
        ModelManager::new(CoreConfig {
            cache_root: root.to_path_buf(),
            hub_base_url: hub,
            ..CoreConfig::default()
        })
        .unwrap()
    }

    fn listing_body() -> &'static str {
        r#"{"siblings":[
            {"rfilename":"config.json"},
            {"rfilename":"tokenizer.json"},
            {"rfilename":"tokenizer_config.json"},
            {"rfilename":"model_q4.onnx"},
            {"rfilename":"README.md"}
        ]}"#
    }

    async fn mock_file(
        server: &mut mockito::ServerGuard,
        file: &str,
        body: &str,
        hits: usize,
    ) -> mockito::Mock {
        server
            .mock("GET", format!("/org/tiny/resolve/main/{file}").as_str())
            .with_status(200)
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn last_status(events: &[DownloadEvent]) -> String {
        events
            .iter()
            .rev()
            .find_map(|e| e.status_text())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn full_acquisition_downloads_the_four_required_files() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(200)
            .with_body(listing_body())
            .create_async()
            .await;
        let _f1 = mock_file(&mut server, "config.json", r#"{"a":1}"#, 1).await;
        let _f2 = mock_file(&mut server, "tokenizer.json", r#"{"b":2}"#, 1).await;
        let _f3 = mock_file(&mut server, "tokenizer_config.json", r#"{"c":3}"#, 1).await;
        let _f4 = mock_file(&mut server, "model_q4.onnx", "weights", 1).await;
        let readme = server
            .mock("GET", "/org/tiny/resolve/main/README.md")
            .expect(0)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), server.url());
        let mut engine = MockEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;

        assert_eq!(outcome, SessionOutcome::Completed);
        assert_eq!(engine.inits, 1);
        assert_eq!(engine.seen_asset_path.as_deref(), Some("dir/model_q4.onnx"));
        assert!(manager
            .variants_present("tiny")
            .contains(&ModelVariant::Q4));
        assert!(!tmp.path().join("tiny/README.md").exists());
        readme.assert_async().await;

        let events = drain(&mut rx);
        assert_eq!(last_status(&events), "Model loaded successfully");
        assert!(events.contains(&DownloadEvent::DownloadStarted { total: 4 }));
    }

    #[tokio::test]
    async fn second_acquisition_performs_no_transfers() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(200)
            .with_body(listing_body())
            .expect(2)
            .create_async()
            .await;
        // Exactly one hit per file across both runs: the second run is
        // satisfied entirely from the cache.
        let f1 = mock_file(&mut server, "config.json", r#"{"a":1}"#, 1).await;
        let f2 = mock_file(&mut server, "tokenizer.json", r#"{"b":2}"#, 1).await;
        let f3 = mock_file(&mut server, "tokenizer_config.json", r#"{"c":3}"#, 1).await;
        let f4 = mock_file(&mut server, "model_q4.onnx", "weights", 1).await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), server.url());
        let mut engine = MockEngine::new();

        let (tx, _rx) = mpsc::unbounded_channel();
        let first = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;
        assert_eq!(first, SessionOutcome::Completed);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let second = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;
        assert_eq!(second, SessionOutcome::Completed);

        for mock in [f1, f2, f3, f4] {
            mock.assert_async().await;
        }
        let events = drain(&mut rx);
        let cached = events
            .iter()
            .filter(
                |e| matches!(e, DownloadEvent::FileCompleted { cached, .. } if *cached),
            )
            .count();
        assert_eq!(cached, 4);
    }

    #[tokio::test]
    async fn cancel_mid_session_stops_after_the_current_file_boundary() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(200)
            .with_body(
                r#"{"siblings":[
                    {"rfilename":"config.json"},
                    {"rfilename":"tokenizer_config.json"},
                    {"rfilename":"tokenizer.json"},
                    {"rfilename":"model_q4.onnx"}
                ]}"#,
            )
            .create_async()
            .await;
        let _f1 = mock_file(&mut server, "config.json", r#"{"a":1}"#, 1).await;
        let _f2 = mock_file(&mut server, "tokenizer_config.json", r#"{"c":3}"#, 1).await;
        // The third file stalls long enough for the cancel to land first.
        let _f3 = server
            .mock("GET", "/org/tiny/resolve/main/tokenizer.json")
            .with_status(200)
            .with_body_from_request(|_| {
                std::thread::sleep(Duration::from_millis(800));
                br#"{"b":2}"#.to_vec()
            })
            .create_async()
            .await;
        let weights = server
            .mock("GET", "/org/tiny/resolve/main/model_q4.onnx")
            .expect(0)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = std::sync::Arc::new(manager(tmp.path(), server.url()));
        let mut engine = MockEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let canceller = {
            let manager = manager.clone();
            async move {
                let mut completed = 0;
                while let Some(event) = rx.recv().await {
                    match event {
                        DownloadEvent::FileCompleted { .. } => {
                            completed += 1;
                            if completed == 2 {
                                manager.cancel().await;
                            }
                        }
                        DownloadEvent::SessionCancelled => return (completed, event),
                        _ => {}
                    }
                }
                panic!("session never reported cancellation");
            }
        };

        let preset = preset();
        let (outcome, (completed, last)) = tokio::join!(
            manager.load_model(&preset, ModelVariant::Q4, &mut engine, tx),
            canceller
        );

        assert_eq!(outcome, SessionOutcome::Cancelled);
        assert_eq!(completed, 2);
        assert_eq!(last.status_text().unwrap(), "Download cancelled");
        assert_eq!(engine.inits, 0);

        // Exactly the two finished files exist; the stalled one was never
        // created and the fourth was never requested.
        assert!(tmp.path().join("tiny/config.json").exists());
        assert!(tmp.path().join("tiny/tokenizer_config.json").exists());
        assert!(!tmp.path().join("tiny/tokenizer.json").exists());
        assert!(!tmp.path().join("tiny/model_q4.onnx").exists());
        weights.assert_async().await;
        assert!(manager.variants_present("tiny").is_empty());
    }

    #[tokio::test]
    async fn unavailable_listing_means_nothing_to_download() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(500)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), server.url());
        let mut engine = MockEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;

        assert_eq!(outcome, SessionOutcome::NothingToDownload);
        assert_eq!(engine.inits, 0);
        assert!(!tmp.path().join("tiny").exists());

        let events = drain(&mut rx);
        assert_eq!(last_status(&events), "Required files not found");
        assert!(events.contains(&DownloadEvent::Progress { fraction: 1.0 }));
    }

    #[tokio::test]
    async fn transfer_failure_surfaces_as_an_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(200)
            .with_body(r#"{"siblings":[{"rfilename":"config.json"}]}"#)
            .create_async()
            .await;
        let _f1 = server
            .mock("GET", "/org/tiny/resolve/main/config.json")
            .with_status(503)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), server.url());
        let mut engine = MockEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;

        assert!(matches!(outcome, SessionOutcome::Failed(_)));
        assert_eq!(engine.inits, 0);
        let events = drain(&mut rx);
        assert!(last_status(&events).starts_with("Error: "));
    }

    #[tokio::test]
    async fn engine_failure_fails_the_session_after_downloads() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(200)
            .with_body(r#"{"siblings":[{"rfilename":"config.json"},{"rfilename":"model_q4.onnx"}]}"#)
            .create_async()
            .await;
        let _f1 = mock_file(&mut server, "config.json", r#"{"a":1}"#, 1).await;
        let _f2 = mock_file(&mut server, "model_q4.onnx", "weights", 1).await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), server.url());
        let mut engine = MockEngine::new();
        engine.fail = true;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;

        assert_eq!(
            outcome,
            SessionOutcome::Failed("Engine error: init failed".into())
        );
        let events = drain(&mut rx);
        assert_eq!(last_status(&events), "Error: Engine error: init failed");
    }

    #[tokio::test]
    async fn engine_extra_fetches_reuse_the_session_fetcher() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/org/tiny")
            .with_status(200)
            .with_body(r#"{"siblings":[{"rfilename":"model_q4.onnx"}]}"#)
            .create_async()
            .await;
        let _f1 = mock_file(&mut server, "model_q4.onnx", "weights", 1).await;
        let _extra = mock_file(&mut server, "generation_config.json", r#"{"g":1}"#, 1).await;

        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), server.url());
        let mut engine = MockEngine::new();
        engine.extra_url = Some(format!(
            "{}/org/tiny/resolve/main/generation_config.json",
            server.url()
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = manager
            .load_model(&preset(), ModelVariant::Q4, &mut engine, tx)
            .await;

        assert_eq!(outcome, SessionOutcome::Completed);
        assert!(tmp.path().join("tiny/generation_config.json").exists());

        // The engine's extra file stretches the narrative past the manifest
        // total.
        let events = drain(&mut rx);
        assert!(events.contains(&DownloadEvent::FileCompleted {
            index: 2,
            total: 2,
            file: "generation_config.json".into(),
            cached: false,
        }));
    }

    #[tokio::test]
    async fn deleting_a_variant_only_removes_its_weights() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tiny");
        fs::create_dir_all(&dir).unwrap();
        for file in ["config.json", "tokenizer_config.json", "tokenizer.json"] {
            fs::write(dir.join(file), "{}").unwrap();
        }
        fs::write(dir.join("model_q4.onnx"), "weights").unwrap();

        let manager = manager(tmp.path(), "http://unused.invalid".into());
        assert_eq!(
            manager.variants_present("tiny"),
            vec![ModelVariant::Q4]
        );

        manager.delete_variant("tiny", ModelVariant::Q4).unwrap();
        assert!(manager.variants_present("tiny").is_empty());
        assert!(dir.join("tokenizer.json").exists());
        assert_eq!(manager.cache().preset_dir("tiny"), PathBuf::from(&dir));
    }
}
