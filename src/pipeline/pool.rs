//! Bounded worker pool for batch stages.
//!
//! Items are dispatched in index order; a permit is taken before each
//! dispatch so at most `max_concurrent` calls are in flight and, with one
//! permit, items run strictly one after another. Results land in
//! index-addressed slots so output order matches input order regardless
//! of completion order.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::cancel::CancellationToken;
use crate::progress::{PipelineStage, ProgressReporter};

/// A batch stopped early by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted {
    pub completed: usize,
    pub skipped: usize,
}

/// Runs per-item futures with bounded concurrency.
pub struct WorkerPool {
    max_concurrent: usize,
    cancel: CancellationToken,
    progress: Arc<ProgressReporter>,
}

impl WorkerPool {
    pub fn new(
        max_concurrent: usize,
        cancel: CancellationToken,
        progress: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            cancel,
            progress,
        }
    }

    /// Run `work` over every item and return one result per item.
    ///
    /// A slot is `Err` only when its task panicked. Cancellation is checked
    /// before each dispatch; once seen, nothing further is started and the
    /// batch reports how many items finished and how many were skipped.
    pub async fn run<I, T, W, Fut>(
        &self,
        stage: PipelineStage,
        items: Vec<I>,
        work: W,
    ) -> Result<Vec<Result<T, String>>, Interrupted>
    where
        W: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        self.progress.progress(stage, 0, total, stage.label());

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let done = Arc::new(AtomicUsize::new(0));
        let mut join_set = JoinSet::new();
        let mut dispatched = 0;

        for (index, item) in items.into_iter().enumerate() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if self.cancel.is_cancelled() {
                tracing::info!(%stage, index, total, "cancellation requested; not starting further items");
                break;
            }

            let fut = work(item);
            let done = Arc::clone(&done);
            let progress = Arc::clone(&self.progress);
            join_set.spawn(async move {
                // Inner task so a panic is caught with its index still known.
                let value = tokio::spawn(fut)
                    .await
                    .map_err(|e| format!("worker task failed: {e}"));
                drop(permit);
                let current = done.fetch_add(1, Ordering::AcqRel) + 1;
                progress.progress(stage, current, total, format!("{} ({current}/{total})", stage.label()));
                (index, value)
            });
            dispatched += 1;
        }

        let mut slots: Vec<Option<Result<T, String>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, value)) => {
                    if let Err(e) = &value {
                        tracing::error!(%stage, index, error = %e, "worker task failed");
                    }
                    slots[index] = Some(value);
                }
                Err(e) => tracing::error!(%stage, error = %e, "worker task failed"),
            }
        }

        if dispatched < total {
            return Err(Interrupted {
                completed: dispatched,
                skipped: total - dispatched,
            });
        }

        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err("worker produced no result".to_string())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pool(max_concurrent: usize) -> WorkerPool {
        WorkerPool::new(
            max_concurrent,
            CancellationToken::new(),
            Arc::new(ProgressReporter::new()),
        )
    }

    #[tokio::test]
    async fn preserves_input_order_under_concurrency() {
        let items: Vec<u64> = (0..8).collect();
        // Later items finish first.
        let out = pool(4)
            .run(PipelineStage::Extraction, items, |n| async move {
                tokio::time::sleep(Duration::from_millis(40 - n * 5)).await;
                n * 10
            })
            .await
            .unwrap();
        let values: Vec<u64> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrent() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let out = pool(2)
            .run(PipelineStage::Extraction, (0..6).collect::<Vec<_>>(), |_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();
        assert_eq!(out.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn reports_progress_per_item() {
        let reporter = Arc::new(ProgressReporter::new());
        let pool = WorkerPool::new(3, CancellationToken::new(), Arc::clone(&reporter));
        pool.run(PipelineStage::Reporting, vec![1, 2, 3], |n| async move { n })
            .await
            .unwrap();
        let state = reporter.state();
        assert_eq!(state.stage, Some(PipelineStage::Reporting));
        assert_eq!((state.processed, state.total), (3, 3));
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(1, token.clone(), Arc::new(ProgressReporter::new()));
        let result = pool
            .run(PipelineStage::Extraction, (0..5).collect::<Vec<usize>>(), |n| {
                let token = token.clone();
                async move {
                    if n == 1 {
                        token.cancel();
                    }
                    n
                }
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            Interrupted {
                completed: 2,
                skipped: 3
            }
        );
    }

    #[tokio::test]
    async fn panicking_item_yields_error_slot() {
        let out = pool(2)
            .run(PipelineStage::Extraction, vec![0, 1, 2], |n| async move {
                if n == 1 {
                    panic!("boom");
                }
                n
            })
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Ok(0));
        assert!(out[1].is_err());
        assert_eq!(out[2], Ok(2));
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        let out = pool(4)
            .run(PipelineStage::Extraction, Vec::<u8>::new(), |n| async move { n })
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
