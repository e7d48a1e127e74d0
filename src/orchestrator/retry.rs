//! In-memory retry set (C5) and the retry phase that drains it after the
//! main cursor walk reaches an empty batch. Re-derived on restart by
//! observing which rows still have `is_extracted=false`; deliberately not
//! persisted (§9's design note).

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::domain::WorkItem;

#[derive(Debug, Default)]
pub struct RetrySet {
    items: HashMap<String, WorkItem>,
}

impl RetrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: WorkItem) {
        self.items.insert(item.code.clone(), item);
    }

    pub fn remove(&mut self, code: &str) {
        self.items.remove(code);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn codes(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

/// `min(2^attempt, 30)` seconds, per §4.5's retry-phase backoff formula.
pub fn backoff(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt).min(30);
    Duration::from_secs(secs)
}

/// Drains `retry_set` one code at a time across up to `max_retries` rounds,
/// sleeping `backoff(attempt)` between rounds. `run_single` retries exactly
/// one item (a single-item batch through C6) and reports success/failure.
/// Returns the codes that still failed after the last round — the caller
/// logs these as permanently failed and must exit non-zero.
pub async fn run_retry_phase<F, Fut>(retry_set: &mut RetrySet, max_retries: u32, mut run_single: F) -> Vec<String>
where
    F: FnMut(WorkItem) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 0..max_retries {
        if retry_set.is_empty() {
            break;
        }
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }
        for code in retry_set.codes() {
            let Some(item) = retry_set.items.get(&code).cloned() else {
                continue;
            };
            if run_single(item).await {
                retry_set.remove(&code);
            }
        }
    }
    retry_set.codes()
}
