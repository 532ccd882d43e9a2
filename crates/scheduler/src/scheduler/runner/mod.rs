//! Report scheduler runner -- owns the queue, the worker pool and the
//! background tasks.
//!
//! Split into focused submodules:
//! - `core`: ReportScheduler struct, constructor, restore and accessors
//! - `scheduling`: enqueueing, admission and re-queue
//! - `execution`: synchronous runs and completion of dispatched runs
//! - `history`: history, design and renderer queries
//! - `retention`: retention sweep and background task supervision

mod core;
mod execution;
mod history;
mod retention;
mod scheduling;

pub use self::core::ReportScheduler;
