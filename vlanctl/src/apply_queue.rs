//! Single-slot apply trigger: latest request wins, requests coalesce while busy.
//!
//! Passes never overlap. Any number of [`ApplyTrigger::request`] calls made
//! while a pass runs result in exactly one follow-up pass.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle that requests an apply pass.
#[derive(Debug, Clone)]
pub struct ApplyTrigger {
    tx: Arc<watch::Sender<u64>>,
}

impl ApplyTrigger {
    pub fn request(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

/// Runs requested passes one at a time.
#[derive(Debug)]
pub struct ApplyWorker {
    rx: watch::Receiver<u64>,
}

/// Create a connected trigger and worker.
pub fn apply_queue() -> (ApplyTrigger, ApplyWorker) {
    let (tx, rx) = watch::channel(0);
    (ApplyTrigger { tx: Arc::new(tx) }, ApplyWorker { rx })
}

impl ApplyWorker {
    /// Run `job` once per coalesced request until every trigger is dropped.
    ///
    /// Requests still pending when the last trigger goes away are served
    /// first. Returns the number of passes run.
    pub async fn run<F, Fut>(mut self, mut job: F) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut passes = 0;
        while self.rx.changed().await.is_ok() {
            let generation = *self.rx.borrow_and_update();
            tracing::debug!(generation, "starting apply pass");
            job().await;
            passes += 1;
        }
        tracing::debug!(passes, "apply queue closed");
        passes
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::apply_queue;

    #[tokio::test]
    async fn burst_before_start_runs_once() {
        let (trigger, worker) = apply_queue();
        trigger.request();
        trigger.request();
        trigger.clone().request();
        drop(trigger);
        assert_eq!(worker.run(|| async {}).await, 1);
    }

    #[tokio::test]
    async fn requests_during_a_pass_coalesce_into_one_follow_up() {
        let (trigger, worker) = apply_queue();
        trigger.request();
        let mut inside = Some(trigger.clone());
        drop(trigger);

        let observed = Cell::new(0);
        let passes = worker
            .run(|| {
                observed.set(observed.get() + 1);
                if let Some(handle) = inside.take() {
                    handle.request();
                    handle.request();
                }
                async {}
            })
            .await;
        assert_eq!(passes, 2);
        assert_eq!(observed.get(), 2);
    }

    #[tokio::test]
    async fn no_request_means_no_pass() {
        let (trigger, worker) = apply_queue();
        drop(trigger);
        assert_eq!(worker.run(|| async {}).await, 0);
    }
}
