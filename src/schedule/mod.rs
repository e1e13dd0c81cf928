pub mod daily;

pub use daily::{DailySchedule, ScheduleRunner};
