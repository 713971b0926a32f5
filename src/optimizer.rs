//! Hill-climbing search for the block-size parameter
//!
//! Evaluating one size means scanning the whole corpus, so every result is
//! memoized and each iteration probes at most two unseen sizes.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;
use tracing::debug;

use crate::error::DedupeError;

/// Outcome of a block-size search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Best block size found.
    pub block_size: usize,
    /// Estimated net savings at that size.
    pub estimated_savings: i64,
    /// True when the step shrank to 1 before the iteration cap was hit.
    pub converged: bool,
    /// Every evaluated size with its estimate, in size order.
    pub evaluated: BTreeMap<usize, i64>,
}

/// Climb from `start`, probing one step below and above the current size.
///
/// A strictly better neighbour becomes the new current size and the step is
/// kept; when the current size is already best the step halves, and the
/// search converges once it can no longer shrink below 1. Sizes below 1 are
/// never probed. Ties never move the search, so a flat savings curve
/// terminates at `start`.
pub async fn search_block_size<F, Fut>(
    start: usize,
    initial_step: usize,
    max_iterations: usize,
    mut evaluate: F,
) -> Result<SearchResult, DedupeError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<i64, DedupeError>>,
{
    let mut evaluated: BTreeMap<usize, i64> = BTreeMap::new();
    let mut current = start.max(1);
    let mut step = initial_step.max(1);
    let mut converged = false;

    let first = evaluate(current).await?;
    evaluated.insert(current, first);

    for _ in 0..max_iterations {
        let mut probes = vec![current];
        if current > step {
            probes.push(current - step);
        }
        probes.push(current + step);

        for &size in &probes {
            if !evaluated.contains_key(&size) {
                let savings = evaluate(size).await?;
                debug!(
                    block_size = size,
                    estimated_savings = savings,
                    "evaluated candidate"
                );
                evaluated.insert(size, savings);
            }
        }

        let mut best = (current, evaluated[&current]);
        for &size in &probes {
            if evaluated[&size] > best.1 {
                best = (size, evaluated[&size]);
            }
        }

        if best.0 != current {
            current = best.0;
            debug!(block_size = current, step, "search moved");
        } else if step <= 1 {
            converged = true;
            break;
        } else {
            step /= 2;
        }
    }

    // Moves only ever go to strictly better sizes, so the current size is
    // the best one evaluated.
    let estimated_savings = evaluated.get(&current).copied().unwrap_or(first);
    Ok(SearchResult {
        block_size: current,
        estimated_savings,
        converged,
        evaluated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_search_finds_unimodal_peak() {
        let result = search_block_size(128, 64, 40, |size| async move {
            let distance = size as i64 - 200;
            Ok(-(distance * distance))
        })
        .await
        .unwrap();
        assert_eq!(result.block_size, 200);
        assert_eq!(result.estimated_savings, 0);
        assert!(result.converged);
    }

    #[tokio::test]
    async fn test_each_size_evaluated_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = search_block_size(128, 64, 40, move |size| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let distance = size as i64 - 200;
                Ok(-(distance * distance))
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), result.evaluated.len());
    }

    #[tokio::test]
    async fn test_flat_curve_terminates_at_start() {
        let result = search_block_size(128, 64, 1000, |_| async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(result.block_size, 128);
        assert_eq!(result.estimated_savings, 42);
        assert!(result.converged);
        // One probe pair per halving of the step, nowhere near the cap.
        assert!(result.evaluated.len() < 20);
    }

    #[tokio::test]
    async fn test_iteration_cap_stops_search() {
        let result = search_block_size(16, 8, 1, |size| async move { Ok(size as i64) })
            .await
            .unwrap();
        assert!(!result.converged);
        assert_eq!(result.block_size, 24);
    }

    #[tokio::test]
    async fn test_never_probes_below_one() {
        let result = search_block_size(1, 64, 10, |size| async move {
            assert!(size >= 1);
            Ok(-(size as i64))
        })
        .await
        .unwrap();
        assert_eq!(result.block_size, 1);
        assert!(result.evaluated.keys().all(|&size| size >= 1));
    }
}
