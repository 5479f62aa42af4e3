//! Shutdown coordination.
//!
//! One watch channel carries the shutdown flag to every long-running loop.

use std::time::Duration;

use tokio::sync::watch;

/// Grace period granted to loops after shutdown is raised.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Owner of the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raise the signal. Returns `true` only for the call that raised it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once the signal observed by `rx` is raised.
///
/// Also resolves if the sender is dropped, since nobody can raise it anymore.
pub async fn wait_for(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|raised| *raised).await;
}
