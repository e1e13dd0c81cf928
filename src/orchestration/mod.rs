//! Orchestration layer for release dispatching
//!
//! This module provides the high-level components that drive a dispatch
//! run across the sub-project roster and persist its outcome.

pub mod dispatcher;
pub mod history;

// Re-export main types for convenience
pub use dispatcher::{
    DispatchOptions, DispatchReport, ReleaseDispatcher, SubProjectOutcome, SubProjectStatus,
    Trigger,
};
pub use history::{DispatchRecord, DispatchStatistics, HistoryOptions, RunHistory};
