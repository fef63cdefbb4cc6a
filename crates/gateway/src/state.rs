//! Shared application state for the gateway

use std::sync::Arc;
use std::time::Duration;

use roomcast_relay::{DurableQueue, EventRouter};
use tokio::sync::watch;
use tracing::{info, warn};

/// Handles the HTTP layer needs from the relay core.
#[derive(Clone)]
pub struct GatewayState {
    pub router: EventRouter,
    /// Read for the health report only; appends go through the router
    pub queue: Arc<dyn DurableQueue>,
    pub sessions: SessionTracker,
}

impl GatewayState {
    pub fn new(router: EventRouter, queue: Arc<dyn DurableQueue>) -> Self {
        Self {
            router,
            queue,
            sessions: SessionTracker::default(),
        }
    }

    /// Close every WebSocket session and wait up to `grace` for them to
    /// finish their disconnect handling.
    ///
    /// Upgraded sockets outlive the HTTP server's graceful shutdown, so this
    /// must run before the router's side-channels are settled. Returns
    /// `false` if some session was still running when `grace` elapsed.
    pub async fn close_sessions(&self, grace: Duration) -> bool {
        let closed = self.router.hub().close().await;
        info!(closed, "closing websocket sessions");

        match tokio::time::timeout(grace, self.sessions.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.sessions.active(),
                    "websocket sessions still running after grace period"
                );
                false
            }
        }
    }
}

/// Counts WebSocket sessions from upgrade until their cleanup is done.
#[derive(Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl SessionTracker {
    /// Mark a session as started. It counts as active until the guard drops.
    pub fn enter(&self) -> SessionGuard {
        self.active.send_modify(|count| *count += 1);
        SessionGuard {
            active: self.active.clone(),
        }
    }

    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Resolve once no session is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self {
            active: Arc::new(watch::channel(0).0),
        }
    }
}

pub struct SessionGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_idle_resolves_when_last_guard_drops() {
        let tracker = SessionTracker::default();
        let first = tracker.enter();
        let second = tracker.enter();
        assert_eq!(tracker.active(), 2);

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.wait_idle().await }
        });
        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn idle_tracker_does_not_wait() {
        let tracker = SessionTracker::default();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .unwrap();
    }
}
