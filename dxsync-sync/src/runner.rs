//! Bounded-concurrency execution of item operations.

use std::future::Future;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Run `op` over `items` with at most `limit` futures in flight.
///
/// Every item settles: a failing operation never cancels its siblings.
/// Outcomes come back in input order; completion order is unconstrained.
pub async fn run_bounded<T, O, F, Fut>(limit: usize, items: Vec<T>, op: F) -> Vec<O>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = O>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;
    let op = &op;
    join_all(items.into_iter().map(|item| async move {
        // The semaphore is never closed, so acquisition only waits.
        let _permit = semaphore.acquire().await.ok();
        op(item).await
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit_and_settles_every_item() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = run_bounded(2, vec![1, 2, 3, 4, 5], |n| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if n == 3 {
                    Err(format!("item {n} failed"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
        assert_eq!(results[2], Err("item 3 failed".to_string()));
    }

    #[tokio::test]
    async fn zero_limit_still_makes_progress() {
        let results = run_bounded(0, vec!["a", "b"], |s| async move { s.len() }).await;
        assert_eq!(results, vec![1, 1]);
    }

    #[tokio::test]
    async fn empty_input_completes() {
        let results: Vec<()> = run_bounded(3, Vec::<u8>::new(), |_| async {}).await;
        assert!(results.is_empty());
    }
}
