use std::sync::Arc;

use tokio::sync::watch;

/// Counting barrier: created with the number of participants, each one
/// calls [`count_down`](Self::count_down) once, waiters block until zero.
///
/// Used for every phase hand-off of a round (listeners bound, nodes
/// converged, listeners torn down).
#[derive(Debug, Clone)]
pub struct CountdownLatch {
    remaining: Arc<watch::Sender<usize>>,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        let (tx, _rx) = watch::channel(count);
        Self {
            remaining: Arc::new(tx),
        }
    }

    pub fn count_down(&self) {
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Counts down once when the returned guard drops, including on panic.
    pub fn arm(&self) -> CountdownGuard {
        CountdownGuard {
            latch: self.clone(),
        }
    }

    pub fn count(&self) -> usize {
        *self.remaining.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[derive(Debug)]
pub struct CountdownGuard {
    latch: CountdownLatch,
}

impl Drop for CountdownGuard {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
