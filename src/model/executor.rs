//! The designated executor every state change is serialized onto
//!
//! Network work runs on the tokio pool, but its completion is marshalled back
//! here before it may touch a `Cell`, `KeyedStore` or the playback clock.

use std::future::Future;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle used to schedule work on the main loop
#[derive(Clone)]
pub struct MainExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

/// Receiving side of the executor; whoever owns it runs the jobs
pub struct MainLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainExecutor {
    pub fn new() -> (Self, MainLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, MainLoop { rx })
    }

    /// Queue a job behind everything already dispatched.
    ///
    /// Returns `false` when the main loop has gone away.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            tracing::trace!("Main loop closed, dropping job");
            return false;
        }
        true
    }

    /// Run `future` in the background and hand its output to `on_complete`
    /// on the main loop.
    pub fn spawn_then<F, C>(&self, future: F, on_complete: C)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        C: FnOnce(F::Output) + Send + 'static,
    {
        let executor = self.clone();
        tokio::spawn(async move {
            let output = future.await;
            executor.dispatch(move || on_complete(output));
        });
    }
}

impl MainLoop {
    /// Run jobs until every executor handle is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
        tracing::debug!("Main loop finished");
    }

    /// Run whatever is queued right now, including jobs queued by those jobs.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn jobs_run_in_dispatch_order() {
        let (executor, mut main_loop) = MainExecutor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            executor.dispatch(move || seen.lock().push(i));
        }

        assert!(seen.lock().is_empty());
        assert_eq!(main_loop.run_pending(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn dispatch_after_loop_dropped_reports_failure() {
        let (executor, main_loop) = MainExecutor::new();
        drop(main_loop);
        assert!(!executor.dispatch(|| {}));
    }

    #[tokio::test]
    async fn spawn_then_completes_on_the_main_loop() {
        let (executor, mut main_loop) = MainExecutor::new();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let result = Arc::new(Mutex::new(None));

        let sink = result.clone();
        executor.spawn_then(async { 21 * 2 }, move |value| {
            *sink.lock() = Some(value);
            let _ = done_tx.send(());
        });

        // Nothing is applied until the main loop runs the completion.
        while main_loop.run_pending() == 0 {
            tokio::task::yield_now().await;
        }
        done_rx.await.unwrap();
        assert_eq!(*result.lock(), Some(42));
    }
}
