// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-run guard with keep-alive.
//!
//! At most one workflow run may be active per orchestrator. Acquisition is
//! a compare-and-swap on a flag, so two concurrent callers can never both
//! win. The returned [`RunPermit`] releases the flag and stops the
//! keep-alive ticker when dropped, on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionHost;

/// Shared busy flag.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    held: Arc<AtomicBool>,
}

impl RunGuard {
    /// An idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run currently holds the guard.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquire without a keep-alive ticker.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                held: self.held.clone(),
                keep_alive: None,
            })
    }

    /// Acquire and ping `host` every `period` until the permit drops. A zero
    /// period disables the ticker.
    pub fn try_acquire_with_keep_alive(
        &self,
        host: Arc<dyn SessionHost>,
        period: Duration,
    ) -> Option<RunPermit> {
        let mut permit = self.try_acquire()?;
        if !period.is_zero() {
            permit.keep_alive = Some(tokio::spawn(keep_alive_loop(host, period)));
        }
        Some(permit)
    }
}

async fn keep_alive_loop(host: Arc<dyn SessionHost>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = host.keep_alive().await {
            debug!(error = %e, "Keep-alive ping failed");
        }
    }
}

/// Proof of holding the [`RunGuard`].
#[derive(Debug)]
pub struct RunPermit {
    held: Arc<AtomicBool>,
    keep_alive: Option<JoinHandle<()>>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if let Some(handle) = self.keep_alive.take() {
            handle.abort();
        }
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockHost;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_concurrent_acquire_has_single_winner() {
        let guard = RunGuard::new();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let guard = guard.clone();
                    scope.spawn(move || guard.try_acquire().map(std::mem::forget).is_some())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_ticks_while_held_and_stops_after_drop() {
        let host = Arc::new(MockHost::new());
        let guard = RunGuard::new();

        let permit = guard
            .try_acquire_with_keep_alive(host.clone(), Duration::from_secs(2))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(host.keep_alive_count(), 3);

        drop(permit);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(host.keep_alive_count(), 3);
        assert!(!guard.is_held());
    }
}
