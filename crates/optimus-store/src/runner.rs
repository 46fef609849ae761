//! Bounded fan-out of independent async tasks.

use std::future::Future;
use std::sync::Arc;

use optimus_core::error::{OptimusError, OptimusResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Runs futures on the tokio runtime and hands back their outputs in
/// submission order.
///
/// Clones share the same permit pool, so nested fan-outs stay within one
/// concurrency limit.
#[derive(Debug, Clone)]
pub struct ParallelRunner {
    permits: Option<Arc<Semaphore>>,
}

impl ParallelRunner {
    /// At most `limit` tasks run at once. A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Some(Arc::new(Semaphore::new(limit.max(1)))),
        }
    }

    pub fn unbounded() -> Self {
        Self { permits: None }
    }

    /// Spawns every task and waits for all of them. A task that panics
    /// yields an internal error in its slot; the others are unaffected.
    pub async fn run<F, T>(&self, tasks: impl IntoIterator<Item = F>) -> Vec<OptimusResult<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set = JoinSet::new();
        let mut count = 0;
        for (idx, task) in tasks.into_iter().enumerate() {
            let permits = self.permits.clone();
            set.spawn(async move {
                let _permit = match permits {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                (idx, task.await)
            });
            count += 1;
        }

        let mut slots: Vec<Option<OptimusResult<T>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, value)) => slots[idx] = Some(Ok(value)),
                Err(err) => error!(error = %err, "runner task did not complete"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(OptimusError::internal("runner", "task panicked or was cancelled"))
                })
            })
            .collect()
    }
}
