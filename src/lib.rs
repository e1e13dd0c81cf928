pub mod core;
pub mod orchestration;
pub mod schedule;
pub mod security;
pub mod steps;
pub mod validation;

pub use crate::core::*;
pub use crate::orchestration::{
    DispatchOptions, DispatchReport, HistoryOptions, ReleaseDispatcher, RunHistory,
    SubProjectOutcome, SubProjectStatus, Trigger,
};
pub use crate::schedule::{DailySchedule, ScheduleRunner};
pub use crate::security::{
    CommandError, IndexCredentials, SafeCommandExecutor, PASSWORD_VAR, USERNAME_VAR,
};
pub use crate::steps::PythonSteps;
pub use crate::validation::{LayoutValidator, RosterValidator};
