//! C1: in-process job store. One coarse lock around the whole map, per the
//! spec's explicit allowance at this scale. Mutators are serialized by the
//! lock; readers get a cloned snapshot so they never observe a half-applied
//! patch.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::domain::{Job, JobId, JobPatch, WorkItem};
use crate::sync_ext::MutexExt;

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, Job>,
}

/// Long-lived component with an explicit lifecycle (it is constructed once
/// by the process entry point and shared via `Arc`), not an ambient
/// singleton — tests build a fresh store per scenario.
#[derive(Debug, Default)]
pub struct JobStore {
    state: Mutex<State>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, items: Vec<WorkItem>) -> Job {
        let job = Job::new(items);
        let mut state = self.state.lock_unpoisoned();
        state.jobs.insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        let state = self.state.lock_unpoisoned();
        state.jobs.get(&id).cloned()
    }

    /// Applies `patch` atomically. Calling this with an unknown `id` is a
    /// fatal programming error (every caller is expected to hold an `id`
    /// that `create` handed back), so it panics rather than returning a
    /// recoverable error.
    pub fn update(&self, id: JobId, patch: JobPatch) {
        let mut state = self.state.lock_unpoisoned();
        let job = state
            .jobs
            .get_mut(&id)
            .unwrap_or_else(|| panic!("update on unknown job id {id}"));

        if let Some(status) = patch.status
            && job.status.allows_transition_to(status)
        {
            job.status = status;
        }
        if let Some(log) = patch.log {
            job.logs.push(log);
        }
        if let Some(delta) = patch.progress_delta {
            job.progress = job.progress.saturating_add(delta.min(u8::MAX as u32) as u8).min(100);
        }
        if let Some((start, end, item_status)) = patch.item_status_range {
            let end = end.min(job.items.len());
            for item in &mut job.items[start.min(end)..end] {
                item.item_status = item_status;
            }
        }
        job.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{ItemStatus, JobStatus, LogEntry, WorkItem};

    use super::*;

    fn sample_items() -> Vec<WorkItem> {
        vec![WorkItem::new("instagram", "A"), WorkItem::new("instagram", "B")]
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = JobStore::new();
        let job = store.create(sample_items());
        let fetched = store.get(job.id).expect("job must exist");
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.items.len(), 2);
    }

    #[test]
    fn get_on_unknown_id_is_absent() {
        let store = JobStore::new();
        assert!(store.get(JobId::new_v4()).is_none());
    }

    #[test]
    fn progress_delta_clamps_to_100_and_never_decreases() {
        let store = JobStore::new();
        let job = store.create(sample_items());
        store.update(job.id, JobPatch::new().with_progress_delta(60));
        assert_eq!(store.get(job.id).unwrap().progress, 60);
        store.update(job.id, JobPatch::new().with_progress_delta(80));
        assert_eq!(store.get(job.id).unwrap().progress, 100);
    }

    #[test]
    fn status_back_transition_is_rejected_as_a_no_op() {
        let store = JobStore::new();
        let job = store.create(sample_items());
        store.update(job.id, JobPatch::new().with_status(JobStatus::Running));
        store.update(job.id, JobPatch::new().with_status(JobStatus::Completed));
        // attempting to move a terminal job backwards must not regress status
        store.update(job.id, JobPatch::new().with_status(JobStatus::Running));
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn item_status_range_updates_only_the_given_prefix() {
        let store = JobStore::new();
        let job = store.create(sample_items());
        store.update(
            job.id,
            JobPatch::new().with_item_status_range(0, 1, ItemStatus::Success),
        );
        let fetched = store.get(job.id).unwrap();
        assert_eq!(fetched.items[0].item_status, ItemStatus::Success);
        assert_eq!(fetched.items[1].item_status, ItemStatus::Waiting);
    }

    #[test]
    fn logs_preserve_insertion_order() {
        let store = JobStore::new();
        let job = store.create(sample_items());
        store.update(job.id, JobPatch::new().with_log(LogEntry::info("first")));
        store.update(job.id, JobPatch::new().with_log(LogEntry::info("second")));
        let logs = store.get(job.id).unwrap().logs;
        assert_eq!(logs[0].msg, "first");
        assert_eq!(logs[1].msg, "second");
    }

    #[test]
    #[should_panic(expected = "unknown job id")]
    fn update_on_unknown_id_panics() {
        let store = JobStore::new();
        store.update(JobId::new_v4(), JobPatch::new().with_status(JobStatus::Running));
    }
}
