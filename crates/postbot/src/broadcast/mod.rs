//! Broadcasting of job status changes.
//!
//! Subscribers (the CLI, tests, a future dashboard) see every transition the
//! store writes without polling the table.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster};
