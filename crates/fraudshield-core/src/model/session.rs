//! Download session lifecycle and cooperative cancellation

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// How long `cancel` waits for in-flight callbacks to observe cancellation
/// before clearing the transfer handle.
const CANCEL_SETTLE: Duration = Duration::from_millis(300);

/// The transfer currently registered with the session, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTransfer {
    pub url: String,
    pub local_path: PathBuf,
}

/// State of the single in-flight acquisition session.
///
/// At most one acquisition may be active at a time; callers cancel the
/// previous session before starting a new one. Cancellation is cooperative:
/// a flag polled at every per-file boundary plus an abort signal selected
/// against every network read, which bounds cancellation latency to at most
/// one file's transfer.
#[derive(Debug)]
pub struct DownloadSession {
    cancelled: AtomicBool,
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
    active: Mutex<Option<ActiveTransfer>>,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadSession {
    pub fn new() -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            cancelled: AtomicBool::new(false),
            abort_tx,
            abort_rx,
            active: Mutex::new(None),
        }
    }

    /// Prepare the session for a fresh acquisition: clear the cancellation
    /// flag, rearm the abort signal, and drop any stale transfer handle.
    /// Stale cancellation state must never leak into a new session.
    pub fn begin(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.abort_tx.send_replace(false);
        self.clear_active();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Per-file boundary poll.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the session has been cancelled. Intended for
    /// `tokio::select!` against network reads.
    pub async fn aborted(&self) {
        let mut rx = self.abort_rx.clone();
        while !*rx.borrow() {
            // The sender lives as long as the session, so changed() only
            // fails after the session itself is gone.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn set_active(&self, transfer: ActiveTransfer) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(transfer);
        }
    }

    pub(crate) fn clear_active(&self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }

    pub fn active_transfer(&self) -> Option<ActiveTransfer> {
        self.active.lock().ok().and_then(|active| active.clone())
    }

    /// Cancel the session: raise the flag, fire the abort signal, wait a
    /// short settle interval so in-flight callbacks observe cancellation,
    /// then clear the transfer handle. Idempotent; cancelling an idle
    /// session still leaves state clean.
    pub async fn cancel(&self) {
        info!("Cancelling download session");
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort_tx.send_replace(true);
        tokio::time::sleep(CANCEL_SETTLE).await;
        self.clear_active();
        debug!("Download session cancelled");
    }

    /// Synchronous hard reset, the fallback when an orderly `cancel` is not
    /// possible. Raises the flag, fires the abort signal, and clears all
    /// handles without waiting.
    pub fn reset(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort_tx.send_replace(true);
        self.clear_active();
    }
}
