//! Core job/work-item/log types shared by every binary in this crate.

mod job;

pub use job::{
    ItemStatus,
    Job,
    JobId,
    JobPatch,
    JobStatus,
    LogEntry,
    LogLevel,
    WorkItem,
};
