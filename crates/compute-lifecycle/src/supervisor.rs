//! Owner of detached background work
//!
//! Provisioning and address polling outlive the request that started them. Each
//! task gets its own deadline measured from when it is submitted, runs inside its
//! own tracing span, and is tracked here so callers can wait for quiescence.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `task` with a deadline `timeout` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(&self, span: tracing::Span, timeout: Duration, task: F)
    where
        F: FnOnce(Instant) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + timeout;
        let handle = tokio::spawn(task(deadline).instrument(span));

        let mut tasks = self.tasks();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Tasks submitted and not yet finished
    pub fn active(&self) -> usize {
        self.tasks().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait until every task has finished, including tasks submitted by tasks
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = self.tasks().drain(..).collect();
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "background task aborted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_follows_nested_tasks() {
        let supervisor = TaskSupervisor::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_supervisor = supervisor.clone();
        let inner_done = done.clone();
        supervisor.spawn(tracing::Span::none(), Duration::from_secs(10), move |_| {
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                inner_done.fetch_add(1, Ordering::SeqCst);

                let nested_done = inner_done.clone();
                inner_supervisor.spawn(
                    tracing::Span::none(),
                    Duration::from_secs(10),
                    move |_| async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        nested_done.fetch_add(1, Ordering::SeqCst);
                    },
                );
            }
        });

        supervisor.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(supervisor.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_measured_from_submission() {
        let supervisor = TaskSupervisor::new();
        let start = Instant::now();
        let (tx, rx) = tokio::sync::oneshot::channel();

        supervisor.spawn(tracing::Span::none(), Duration::from_secs(120), move |deadline| {
            async move {
                let _ = tx.send(deadline);
            }
        });

        let deadline = rx.await.unwrap();
        assert_eq!(deadline - start, Duration::from_secs(120));
        supervisor.wait_idle().await;
    }

    #[tokio::test]
    async fn test_wait_idle_with_nothing_submitted() {
        TaskSupervisor::new().wait_idle().await;
    }
}
