use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Run every task of a phase concurrently and wait for all of them.
///
/// At most `max_concurrency` invocations are in flight at once. A failing
/// task never cancels its siblings: every outcome is collected, in
/// completion order.
///
/// # Arguments
///
/// * `task_ids` - Ids of the tasks in this phase
/// * `max_concurrency` - Maximum number of concurrent tasks, clamped to
///   `1..=Semaphore::MAX_PERMITS`
/// * `executor_fn` - Async function running a single task
pub async fn execute_phase_parallel<'a, F, Fut, T>(
    task_ids: &'a [String],
    max_concurrency: usize,
    executor_fn: F,
) -> Vec<(String, T)>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = T>,
{
    let sem = Semaphore::new(max_concurrency.clamp(1, Semaphore::MAX_PERMITS));
    let mut futs = FuturesUnordered::new();

    for id in task_ids {
        let sem = &sem;
        let executor = &executor_fn;

        futs.push(async move {
            // the semaphore is never closed, so a permit is always granted
            let _permit = sem.acquire().await.ok();
            (id.clone(), executor(id.as_str()).await)
        });
    }

    let mut outcomes = Vec::with_capacity(task_ids.len());
    while let Some(outcome) = futs.next().await {
        outcomes.push(outcome);
    }

    outcomes
}

/// Run the tasks of a phase one at a time, in order.
///
/// `should_stop` is consulted before each task. Once it returns true the
/// remaining tasks are left untouched and the returned flag is set.
pub async fn execute_phase_sequential<'a, F, Fut, T, S>(
    task_ids: &'a [String],
    should_stop: S,
    mut executor_fn: F,
) -> (Vec<(String, T)>, bool)
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = T>,
    S: Fn() -> bool,
{
    let mut outcomes = Vec::with_capacity(task_ids.len());

    for id in task_ids {
        if should_stop() {
            return (outcomes, true);
        }
        let outcome = executor_fn(id.as_str()).await;
        outcomes.push((id.clone(), outcome));
    }

    (outcomes, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_parallel_respects_concurrency_bound() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let task_ids = ids(6);

        let outcomes = execute_phase_parallel(&task_ids, 2, |id| {
            let active = &active;
            let peak = &peak;
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                id.len()
            }
        })
        .await;

        assert_eq!(outcomes.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_parallel_accepts_unbounded_concurrency() {
        let task_ids = ids(4);
        let outcomes =
            execute_phase_parallel(&task_ids, usize::MAX, |id| async move { id.to_string() })
                .await;
        assert_eq!(outcomes.len(), 4);

        let outcomes = execute_phase_parallel(&task_ids, 0, |id| async move { id.len() }).await;
        assert_eq!(outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_parallel_collects_failures() {
        let task_ids = ids(3);
        let outcomes = execute_phase_parallel(&task_ids, 8, |id| async move {
            if id == "2" {
                Err(format!("{id} failed"))
            } else {
                Ok(id.to_string())
            }
        })
        .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|(_, r)| r.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_stops_when_asked() {
        let task_ids = ids(3);
        let ran = AtomicUsize::new(0);

        let (outcomes, stopped) = execute_phase_sequential(
            &task_ids,
            || ran.load(Ordering::SeqCst) >= 1,
            |id| {
                ran.fetch_add(1, Ordering::SeqCst);
                async move { id.to_string() }
            },
        )
        .await;

        assert!(stopped);
        assert_eq!(outcomes, vec![("1".to_string(), "1".to_string())]);
    }
}
