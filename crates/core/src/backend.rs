use crate::error::ExecutionError;
use crate::types::PathResult;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One path run handed to a backend.
pub type Job = BoxFuture<'static, Result<PathResult, ExecutionError>>;

/// Runs a batch of jobs and returns their results in input order
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn run(&self, jobs: Vec<Job>) -> Vec<Result<PathResult, ExecutionError>>;

    fn name(&self) -> &'static str;
}

/// Awaits each job before starting the next
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

#[async_trait::async_trait]
impl Backend for Sequential {
    async fn run(&self, jobs: Vec<Job>) -> Vec<Result<PathResult, ExecutionError>> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(job.await);
        }
        results
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Spawns every job onto the tokio runtime
#[derive(Debug, Clone, Default)]
pub struct Pooled {
    permits: Option<Arc<Semaphore>>,
}

impl Pooled {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run at most `limit` jobs at once.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            permits: Some(Arc::new(Semaphore::new(limit.max(1)))),
        }
    }
}

#[async_trait::async_trait]
impl Backend for Pooled {
    async fn run(&self, jobs: Vec<Job>) -> Vec<Result<PathResult, ExecutionError>> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let permits = self.permits.clone();
                tokio::spawn(async move {
                    let _permit = match permits {
                        Some(semaphore) => match semaphore.acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(e) => return Err(ExecutionError::Join(e.to_string())),
                        },
                        None => None,
                    };
                    job.await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Backend job failed to join: {}", e);
                    Err(ExecutionError::Join(e.to_string()))
                }
            };
            results.push(result);
        }
        results
    }

    fn name(&self) -> &'static str {
        "pooled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn delayed(name: &str, millis: u64) -> Job {
        let name = name.to_string();
        async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(PathResult::new(name, Vec::new()))
        }
        .boxed()
    }

    fn names(results: Vec<Result<PathResult, ExecutionError>>) -> Vec<String> {
        results.into_iter().map(|r| r.unwrap().name).collect()
    }

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let results = Sequential.run(vec![delayed("a", 5), delayed("b", 0)]).await;
        assert_eq!(names(results), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_pooled_preserves_order() {
        let results = Pooled::new()
            .run(vec![delayed("a", 30), delayed("b", 0), delayed("c", 10)])
            .await;
        assert_eq!(names(results), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_pooled_limit_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(PathResult::new(format!("path_{}", i), Vec::new()))
                }
                .boxed()
            })
            .collect();

        let results = Pooled::with_limit(2).run(jobs).await;
        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_pooled_reports_errors_in_place() {
        let failing: Job = async { Err(ExecutionError::Cancelled) }.boxed();
        let results = Pooled::new().run(vec![delayed("a", 0), failing]).await;

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ExecutionError::Cancelled)));
    }
}
