//! Priority queue scheduler for report requests.
//!
//! Requests enter either through [`ReportScheduler::queue_report`], which
//! returns once the request is QUEUED, or through
//! [`ReportScheduler::run_report`], which executes on the caller's thread.
//! Queued requests are admitted by [`ReportScheduler::maybe_run_next_queued_report`]
//! while fewer than `max_parallel_reports` requests are in progress, and run
//! on a bounded worker pool. The pending queue and the in-progress set sit
//! behind one mutex, so a queue head is only ever dispatched once.

pub mod metrics;
pub mod queue;
pub mod runner;
mod supervisor;

pub use metrics::SchedulerMetrics;
pub use queue::{PendingQueue, QueueKey};
pub use runner::ReportScheduler;
