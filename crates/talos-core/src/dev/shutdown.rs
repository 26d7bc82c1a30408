//! Shutdown broadcast shared by the dev supervisor and its tasks.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Signal(&'static str),
    Requested,
    /// Nothing could be started.
    StartupFailure(String),
    /// Every spawned process has exited on its own.
    ServicesExited,
}

impl ShutdownReason {
    pub fn is_signal(&self) -> bool {
        matches!(self, ShutdownReason::Signal(_) | ShutdownReason::Requested)
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::Requested => f.write_str("shutdown requested"),
            ShutdownReason::StartupFailure(reason) => write!(f, "startup failed: {reason}"),
            ShutdownReason::ServicesExited => f.write_str("all services exited"),
        }
    }
}

/// Set-once shutdown event. Clones observe the same event.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Set the event. Returns `false` when it was already set.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut reason = Some(reason);
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = reason.take();
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    /// Resolve once the event is set.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(ShutdownReason::Requested),
            Err(_) => ShutdownReason::Requested,
        }
    }
}

/// Trigger `shutdown` on the first SIGINT or SIGTERM. Later signals are
/// ignored while shutdown is in progress.
pub fn listen_for_signals(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let name = wait_for_signal().await;
            if shutdown.trigger(ShutdownReason::Signal(name)) {
                info!(signal = name, "Received signal, shutting down");
            } else {
                warn!(signal = name, "Shutdown already in progress");
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
