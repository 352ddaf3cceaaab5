//! Periodic background loops with a cooperative stop signal.

use log::{debug, error};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Stop switch for the loops a node runs.
///
/// Each [`begin`](Self::begin) opens a fresh stop channel, so loops can be
/// started again after [`halt`](Self::halt). While one set runs, further
/// `begin` calls are refused.
#[derive(Default)]
pub struct LoopControl {
    stop: Mutex<Option<watch::Sender<bool>>>,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop receiver for a new set of loops, or `None` if one already runs.
    pub async fn begin(&self) -> Option<watch::Receiver<bool>> {
        let mut stop = self.stop.lock().await;
        if stop.is_some() {
            return None;
        }

        let (sender, receiver) = watch::channel(false);
        *stop = Some(sender);
        Some(receiver)
    }

    /// Signal the running loops to exit.
    pub async fn halt(&self) {
        if let Some(sender) = self.stop.lock().await.take() {
            sender.send_replace(true);
        }
    }
}

/// When a loop sleeps relative to its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Work, then sleep (scans: the first result should arrive early).
    WorkFirst,
    /// Sleep, then work (cleanup: nothing can be stale at start).
    SleepFirst,
}

/// Run `round` every `interval` until `stop` flips to `true` (or its sender
/// is dropped).
///
/// Each round runs in its own task: a round that panics is logged and the
/// loop carries on after its normal interval.
pub async fn run_periodic<F, Fut>(
    label: &'static str,
    interval: Duration,
    cadence: Cadence,
    mut stop: watch::Receiver<bool>,
    round: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        if *stop.borrow() {
            break;
        }

        if cadence == Cadence::SleepFirst {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => break,
            }
        }

        if let Err(e) = tokio::spawn(round()).await {
            error!("❌ {} round failed: {}", label, e);
        }

        if cadence == Cadence::WorkFirst {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => break,
            }
        }
    }

    debug!("{} loop stopped", label);
}
