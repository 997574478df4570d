// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Manages graceful shutdown across the API server and the pipeline worker
//! pool.
//!
//! ## Design Pattern
//!
//! - **Cancellation tokens** propagate the shutdown signal to every task
//! - **Grace period** bounds how long in-flight runs may keep settling
//! - **Signal wiring** translates SIGINT/SIGTERM into one initiation
//!
//! A worker observing the token finishes its current stage boundary, lets
//! the run's own cancellation path mark remaining stages, and reports done;
//! the coordinator releases `main` once every component checked in or the
//! grace period expired.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Default grace period for graceful shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(20);

/// Clone-able token signalling process shutdown to async tasks.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and wake all waiters.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Coordinates shutdown across registered components.
///
/// Components register with [`ShutdownCoordinator::register`] and signal
/// completion by dropping the returned guard; `main` waits on
/// [`ShutdownCoordinator::wait_for_drain`].
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
    active: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

/// Guard marking one component as busy; dropping it checks the component in.
pub struct ComponentGuard {
    active: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drop for ComponentGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
            active: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Token clones for worker tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Registers a component that must check in before shutdown completes.
    pub fn register(&self) -> ComponentGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ComponentGuard {
            active: Arc::clone(&self.active),
            drained: Arc::clone(&self.drained),
        }
    }

    /// Initiates shutdown; idempotent.
    pub fn initiate(&self) {
        if !self.token.is_cancelled() {
            tracing::info!(grace_period = ?self.grace_period, "initiating graceful shutdown");
            self.token.cancel();
        }
    }

    /// Waits for all registered components to check in, bounded by the
    /// grace period. Returns `true` when the drain completed in time.
    pub async fn wait_for_drain(&self) -> bool {
        let deadline = tokio::time::sleep(self.grace_period);
        tokio::pin!(deadline);
        loop {
            if self.active.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let notified = self.drained.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return true;
            }
            tokio::select! {
                _ = notified => {}
                _ = &mut deadline => {
                    tracing::warn!(
                        remaining = self.active.load(Ordering::SeqCst),
                        "shutdown grace period expired with components still active"
                    );
                    return false;
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

/// Wires SIGINT (and SIGTERM on Unix) to shutdown initiation.
pub fn spawn_signal_listener(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        coordinator.initiate();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_token_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        waiter.cancelled().await;
        assert!(waiter.is_cancelled());
    }

    #[tokio::test]
    async fn test_drain_completes_when_components_check_in() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let guard = coordinator.register();
        coordinator.initiate();

        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_drain().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_drain_times_out_with_stuck_component() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(30));
        let _guard = coordinator.register();
        coordinator.initiate();
        assert!(!coordinator.wait_for_drain().await);
    }

    #[tokio::test]
    async fn test_drain_with_no_components_is_instant() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.initiate();
        assert!(coordinator.wait_for_drain().await);
    }
}
