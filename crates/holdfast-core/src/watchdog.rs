//! Background renewal loop for held locks.
//!
//! One watchdog task is spawned per successful acquisition. It wakes at
//! half the lock's expiration, leaving margin for one missed cycle before
//! the backend would let the lock lapse, and renews through the same
//! exclusive-access mutex that acquisition and release use, so a tick can
//! never renew a lock that is simultaneously being released.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::backend::LockBackend;
use crate::handle::LockHandle;

/// Renewal counter, labelled by backend type.
const RENEWALS: &str = "holdfast_lock_renewals_total";
/// Failed-renewal counter; each increment corresponds to one lost lock.
const RENEWAL_FAILURES: &str = "holdfast_lock_renewal_failures_total";

/// Spawn the renewal loop for a freshly acquired handle.
///
/// The task stops on its own when `stop` is cancelled, when the handle is
/// no longer held, or when a renewal fails. A failed renewal flips the
/// held flag: the lock may already belong to someone else, so it is
/// surfaced (log + counter) rather than retried.
pub(crate) fn spawn(
    handle: LockHandle,
    backend: Arc<dyn LockBackend>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let period = period_for(handle.expiration());
    tokio::spawn(run(handle, backend, stop, period))
}

fn period_for(expiration: Duration) -> Duration {
    // Renew at the halfway point of validity, never busier than every 10ms.
    (expiration / 2).max(Duration::from_millis(10))
}

async fn run(
    handle: LockHandle,
    backend: Arc<dyn LockBackend>,
    stop: CancellationToken,
    period: Duration,
) {
    let backend_type = backend.backend_type();
    // First tick one period after start, not immediately.
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!(key = %handle.key(), backend = backend_type, "watchdog stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let mut state = handle.inner.state.lock().await;
        if !handle.is_held() {
            // Released (or superseded) since the last tick; nothing to do.
            return;
        }

        let mut lease = handle.inner.lease(&mut state);
        match backend.renew(&mut lease).await {
            Ok(()) => {
                counter!(RENEWALS, "backend" => backend_type).increment(1);
                tracing::debug!(key = %handle.key(), backend = backend_type, "lock renewed");
            }
            Err(err) => {
                counter!(RENEWAL_FAILURES, "backend" => backend_type).increment(1);
                tracing::warn!(
                    key = %handle.key(),
                    backend = backend_type,
                    error = %err,
                    "failed to renew lock, treating it as lost"
                );
                handle.inner.held.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
}
