//! Cooperative shutdown.
//!
//! One [`Shutdown`] handle broadcasts the stop request; every cooperating task
//! holds a [`ShutdownListener`] and drops it once it has wound down. The
//! handle can then wait, for a bounded time, until all listeners are gone.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Sending side of the shutdown broadcast. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Creates an untriggered shutdown handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a new listener for a cooperating task.
    #[must_use]
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Tells every listener to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of listeners still alive.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Waits until every listener has been dropped or `grace` elapses.
    ///
    /// Returns true if all listeners acknowledged in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.tx.closed()).await.is_ok()
    }
}

/// Receiving side of the shutdown broadcast.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Returns true if shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested.
    ///
    /// If every [`Shutdown`] handle is dropped without triggering, nobody can
    /// request a stop any more and this never resolves.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Final step of a fatal shutdown.
pub trait ProcessExit: Send + Sync {
    /// Ends the process with `code`. Production implementations do not return.
    fn exit(&self, code: i32);
}

/// Exits through [`std::process::exit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}
