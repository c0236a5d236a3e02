//! Delayed resynchronisation of dependent features.
//!
//! The TV's sub-resources are not updated atomically: switching the TV to
//! standby also turns off the screen and Ambilight, but each reports the
//! change on its own schedule. After a write, the publishing feature hands
//! a [`StateChange`] to its [`Notifier`], which waits a per-feature delay and
//! then lets every registered [`Dependant`] catch up.
//!
//! Delivery is a spawned task, never a call chain, so a mistakenly cyclic
//! registration causes extra refreshes but cannot deadlock.

use crate::error::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};

/// Which feature published a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Power,
    Screen,
    Volume,
    Ambilight,
}

/// Facts a publisher knows after its write settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Power { on: bool },
    Screen { on: bool },
    Volume,
    Ambilight { on: bool },
}

impl StateChange {
    pub fn publisher(&self) -> FeatureKind {
        match self {
            Self::Power { .. } => FeatureKind::Power,
            Self::Screen { .. } => FeatureKind::Screen,
            Self::Volume => FeatureKind::Volume,
            Self::Ambilight { .. } => FeatureKind::Ambilight,
        }
    }
}

/// A feature that resynchronises when another feature changed.
#[async_trait]
pub trait Dependant: Send + Sync {
    fn name(&self) -> &'static str;

    /// React to `change`. The usual reaction is to invalidate and re-read
    /// the own cache; a dependant may instead adopt facts from `change`.
    async fn acknowledge(&self, change: &StateChange) -> Result<()>;
}

/// Handle to one scheduled delivery.
pub struct PendingRefresh {
    handle: JoinHandle<()>,
}

impl PendingRefresh {
    /// Drop the delivery if it has not started yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait until every dependant was acknowledged (or the delivery was cancelled).
    pub async fn finished(self) {
        let _ = self.handle.await;
    }
}

/// Dependant list plus the timer tasks delivering to it.
pub struct Notifier {
    publisher: FeatureKind,
    delay: Duration,
    dependants: RwLock<Vec<Weak<dyn Dependant>>>,
    pending: Mutex<Vec<AbortHandle>>,
}

impl Notifier {
    pub fn new(publisher: FeatureKind, delay: Duration) -> Self {
        Self {
            publisher,
            delay,
            dependants: RwLock::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Register a one-way edge. Done during setup, before any publishing.
    pub fn add_dependant<D: Dependant + 'static>(&self, target: &Arc<D>) {
        let target: Arc<dyn Dependant> = target.clone();
        self.dependants.write().push(Arc::downgrade(&target));
    }

    pub fn dependant_count(&self) -> usize {
        self.dependants
            .read()
            .iter()
            .filter(|d| d.strong_count() > 0)
            .count()
    }

    /// After the delay, acknowledge `change` to every live dependant once.
    ///
    /// A failing dependant is logged and does not affect the others.
    pub fn schedule_dependant_refresh(&self, change: StateChange) -> PendingRefresh {
        debug_assert_eq!(change.publisher(), self.publisher);
        let dependants = self.dependants.read().clone();
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let live: Vec<Arc<dyn Dependant>> =
                dependants.iter().filter_map(Weak::upgrade).collect();
            log::debug!(
                "[Notifier] delivering {:?} to {} dependant(s)",
                change,
                live.len()
            );

            let outcomes = join_all(live.iter().map(|d| d.acknowledge(&change))).await;
            for (dependant, outcome) in live.iter().zip(outcomes) {
                if let Err(e) = outcome {
                    log::warn!(
                        "[Notifier] {} failed to resync after {:?}: {}",
                        dependant.name(),
                        change,
                        e
                    );
                }
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle.abort_handle());
        PendingRefresh { handle }
    }

    /// Abort every delivery that has not completed yet.
    pub fn cancel_pending(&self) {
        for handle in self.pending.lock().drain(..) {
            handle.abort();
        }
    }
}
