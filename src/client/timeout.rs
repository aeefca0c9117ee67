//! @ai:module:intent Scoped timeout timer that aborts a controller
//! @ai:module:layer infrastructure
//! @ai:module:public_api TimeoutGuard
//! @ai:module:stateless false

use crate::client::signal::AbortController;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// @ai:intent Timer armed for the lifetime of one request
///
/// Dropping the guard clears the timer and releases its slot in the
/// shared pending counter, whichever way the request settled.
pub(crate) struct TimeoutGuard {
    timer: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl TimeoutGuard {
    /// @ai:intent Arm a timer that aborts `controller` after `timeout`
    /// @ai:pre called from within a tokio runtime
    /// @ai:post a zero timeout has already fired on return
    /// @ai:effects state:write, time
    pub(crate) fn arm(
        controller: &AbortController,
        timeout: Option<Duration>,
        pending: &Arc<AtomicUsize>,
    ) -> Self {
        let fired = Arc::new(AtomicBool::new(false));

        if timeout.is_some_and(|t| t.is_zero()) {
            fired.store(true, Ordering::SeqCst);
            controller.abort();
        }

        let timer = timeout.filter(|t| !t.is_zero()).map(|timeout| {
            pending.fetch_add(1, Ordering::SeqCst);
            let controller = controller.clone();
            let fired = Arc::clone(&fired);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                fired.store(true, Ordering::SeqCst);
                controller.abort();
            })
        });

        Self {
            timer,
            fired,
            pending: Arc::clone(pending),
        }
    }

    /// @ai:intent Whether the deadline elapsed
    /// @ai:effects pure
    pub(crate) fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
