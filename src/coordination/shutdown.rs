//! Graceful Shutdown Handler
//!
//! A shutdown request only interrupts the wait between cycles. A cycle that
//! is already running finishes (or hits its own timeouts) before the agent
//! loop looks at the listener again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM from the process supervisor
    Terminate,
    /// Requested from code (tests, `once` mode)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Terminate => write!(f, "terminate"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Owning side of the shutdown channel
pub struct ShutdownController {
    shutdown_requested: AtomicBool,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(None);
        Self {
            shutdown_requested: AtomicBool::new(false),
            signal_tx,
        }
    }

    /// Listener handed to the agent loop
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            signal_rx: self.signal_tx.subscribe(),
            _sender: None,
        }
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.signal_tx.send_replace(Some(signal));
    }
}

/// Cloneable view of the shutdown state for async tasks
#[derive(Clone)]
pub struct ShutdownListener {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
    /// Keeps the channel of a `never()` listener open
    _sender: Option<Arc<watch::Sender<Option<ShutdownSignal>>>>,
}

impl ShutdownListener {
    /// Listener that never fires
    pub fn never() -> Self {
        let (tx, signal_rx) = watch::channel(None);
        Self {
            signal_rx,
            _sender: Some(Arc::new(tx)),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_rx.borrow().is_some()
    }

    /// Resolves once shutdown is requested. A dropped controller counts as
    /// a request.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.signal_rx.borrow_and_update() {
                return signal;
            }
            if self.signal_rx.changed().await.is_err() {
                return ShutdownSignal::Requested;
            }
        }
    }
}

/// Forward SIGINT / SIGTERM to the controller
pub async fn install_signal_handlers(shutdown: Arc<ShutdownController>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT");
            shutdown.request_shutdown(ShutdownSignal::Interrupt);
        },
        _ = terminate => {
            info!("Received SIGTERM");
            shutdown.request_shutdown(ShutdownSignal::Terminate);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "interrupt");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "terminate");
    }

    #[tokio::test]
    async fn test_shutdown_request() {
        let shutdown = ShutdownController::new();
        let listener = shutdown.listener();

        assert!(!shutdown.is_shutdown_requested());
        assert!(!listener.is_shutdown_requested());

        shutdown.request_shutdown(ShutdownSignal::Terminate);
        assert!(shutdown.is_shutdown_requested());
        assert!(listener.is_shutdown_requested());

        // Duplicate request should be ignored
        shutdown.request_shutdown(ShutdownSignal::Interrupt);
        let mut listener = shutdown.listener();
        assert_eq!(listener.wait_for_shutdown().await, ShutdownSignal::Terminate);
    }

    #[tokio::test]
    async fn test_listener_wakes_on_request() {
        let shutdown = Arc::new(ShutdownController::new());
        let mut listener = shutdown.listener();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.request_shutdown(ShutdownSignal::Requested);
        });

        let signal = tokio::time::timeout(Duration::from_secs(5), listener.wait_for_shutdown())
            .await
            .unwrap();
        assert_eq!(signal, ShutdownSignal::Requested);
    }

    #[tokio::test]
    async fn test_never_listener_stays_quiet() {
        let mut listener = ShutdownListener::never();
        assert!(!listener.is_shutdown_requested());
        let waited = tokio::time::timeout(Duration::from_millis(20), listener.wait_for_shutdown()).await;
        assert!(waited.is_err());
    }
}
