//! The process-wide cancellation signal every connection honors at each of
//! its suspension points: accept, peek/handshake, header reads, body reads,
//! handler execution, writer pre-write, flush, write. Built on
//! `tokio::sync::Notify` rather than a dedicated cancellation crate.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A broadcastable "stop now" signal. One instance is shared (via `Arc`)
/// across the accept loop and every connection it spawns; triggering it
/// unblocks every in-flight suspension point at once.
#[derive(Default)]
pub struct Shutdown {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Shutdown::default())
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Races `fut` against the shutdown signal. `None` means shutdown won --
    /// the caller treats that suspension point as cancelled.
    pub async fn race<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        if self.is_triggered() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.notify.notified() => None,
            v = fut => Some(v),
        }
    }

    /// Like [`Shutdown::race`], but also bounds `fut` by an optional
    /// per-stream timeout, configured by the caller on individual reads and
    /// writes. `None` means either shutdown or the timeout won; callers
    /// report both as a protocol failure.
    pub async fn race_timeout<T>(&self, timeout: Option<std::time::Duration>, fut: impl Future<Output = T>) -> Option<T> {
        match timeout {
            None => self.race(fut).await,
            Some(d) => {
                if self.is_triggered() {
                    return None;
                }
                tokio::select! {
                    biased;
                    _ = self.notify.notified() => None,
                    r = tokio::time::timeout(d, fut) => r.ok(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn race_returns_the_future_when_not_triggered() {
        let s = Shutdown::new();
        let result = s.race(async { 42 }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn race_returns_none_once_triggered() {
        let s = Shutdown::new();
        s.trigger();
        let result = s.race(std::future::pending::<()>()).await;
        assert_eq!(result, None);
    }
}
