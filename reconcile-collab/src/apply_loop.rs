//! Timer-driven pump for [`ClientReconciler`].
//!
//! One `tick()` per interval: at most one edit is applied per frame and the
//! content callback fires on the frame after the queue drains.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reconcile_core::{ClientReconciler, Tick};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn the apply loop. It stops once nothing else holds the reconciler;
/// abort the handle to stop it earlier.
pub fn spawn_apply_loop(reconciler: Arc<Mutex<ClientReconciler>>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if Arc::strong_count(&reconciler) == 1 {
                break;
            }

            let mut guard = reconciler.lock();
            match guard.tick() {
                Tick::Flushed => log::trace!("Flushed {} ({} applied)", guard.document_id(), guard.applied()),
                Tick::Applied(kind) => log::trace!("Applied {kind} to {}", guard.document_id()),
                Tick::Idle => {}
            }
        }
    })
}
