//! Run control shared between the engine and its handles.
//!
//! Pausing flips a watch flag that the run loop waits on between steps.
//! Cancelling fires a token that also wakes a paused run, so a cancel
//! always beats a pending resume.

use super::progress::{ReplayEvent, ReplayProgress};
use super::ReplayStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

pub(crate) struct Shared {
    progress: Mutex<ReplayProgress>,
    paused: watch::Sender<bool>,
    cancel: Mutex<CancellationToken>,
    events: broadcast::Sender<ReplayEvent>,
}

impl Shared {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            progress: Mutex::new(ReplayProgress::idle()),
            paused: watch::Sender::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            events,
        })
    }

    pub(crate) fn status(&self) -> ReplayStatus {
        self.progress.lock().status
    }

    pub(crate) fn snapshot(&self) -> ReplayProgress {
        self.progress.lock().clone()
    }

    /// Apply a change and return the resulting snapshot.
    pub(crate) fn update(&self, f: impl FnOnce(&mut ReplayProgress)) -> ReplayProgress {
        let mut progress = self.progress.lock();
        f(&mut progress);
        progress.clone()
    }

    /// Publishing never blocks; with no subscribers the event is dropped.
    pub(crate) fn publish(&self, event: ReplayEvent) {
        if self.events.send(event).is_err() {
            debug!("no replay observers subscribed");
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.events.subscribe()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    pub(crate) fn pause_flag(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    pub(crate) fn pause(&self) -> bool {
        let changed = {
            let mut progress = self.progress.lock();
            if progress.status != ReplayStatus::Running {
                return false;
            }
            progress.status = ReplayStatus::Paused;
            progress.clone()
        };
        self.paused.send_replace(true);
        info!("Replay paused");
        self.publish(ReplayEvent::StatusChanged(changed));
        true
    }

    pub(crate) fn resume(&self) -> bool {
        let changed = {
            let mut progress = self.progress.lock();
            if progress.status != ReplayStatus::Paused {
                return false;
            }
            progress.status = ReplayStatus::Running;
            progress.clone()
        };
        self.paused.send_replace(false);
        info!("Replay resumed");
        self.publish(ReplayEvent::StatusChanged(changed));
        true
    }

    /// An idle engine becomes `Cancelled` at once; an active run observes
    /// the token at its next check and finishes itself.
    pub(crate) fn cancel(&self) -> bool {
        let idle_cancelled = {
            let mut progress = self.progress.lock();
            match progress.status {
                s if s.is_terminal() => return false,
                ReplayStatus::Idle => {
                    progress.finish(ReplayStatus::Cancelled, None);
                    Some(progress.clone())
                }
                _ => None,
            }
        };
        self.cancel.lock().cancel();
        info!("Replay cancel requested");
        if let Some(progress) = idle_cancelled {
            self.publish(ReplayEvent::StatusChanged(progress));
        }
        true
    }

    pub(crate) fn reset(&self) {
        *self.cancel.lock() = CancellationToken::new();
        self.paused.send_replace(false);
        let progress = self.update(|p| *p = ReplayProgress::idle());
        self.publish(ReplayEvent::StatusChanged(progress));
    }
}

/// Cloneable remote control for a replay engine.
///
/// Lets another task pause, resume or cancel a run while the engine is
/// busy executing it.
#[derive(Clone)]
pub struct ReplayHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ReplayHandle {
    /// Takes effect before the next step starts. Returns `false` unless a
    /// run was in progress.
    pub fn pause(&self) -> bool {
        self.shared.pause()
    }

    pub fn resume(&self) -> bool {
        self.shared.resume()
    }

    /// Returns `false` if the run had already finished.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    pub fn status(&self) -> ReplayStatus {
        self.shared.status()
    }

    pub fn progress(&self) -> ReplayProgress {
        self.shared.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.shared.subscribe()
    }
}
