//! Filedepot Worker – event consumption and processing infrastructure.
//!
//! This crate provides the worker pool (claiming, bounded concurrency,
//! retry via channel redelivery) and the `ProcessOperation` trait for the
//! configured per-event operation. Deployments register operations and run
//! one or more pool instances as competing consumers.

mod operation;
mod pool;
mod worker;

pub use operation::{InspectOperation, OperationRegistry, ProcessOperation};
pub use pool::EventWorkerPool;
pub use worker::ProcessingWorker;
