//! Recurring lock windows.
//!
//! Schedules are stored in `<home>/schedules.json` and evaluated on a fixed
//! tick. A schedule that is active engages a lock until its end time, unless
//! a lock (of any origin) is already running.
//!
//! Windows are half-open at minute granularity: the start minute is inside,
//! the end minute is not. A window whose end is not after its start (for
//! example 22:00-02:00) is never active; overnight windows are not
//! supported.

mod evaluator;
mod model;
mod store;


pub use evaluator::{EvaluatorSettings, ScheduleEvaluator, WindowCheck, check_active, starts_within};
pub use model::{NewSchedule, Recurrence, Schedule};
pub use store::{FileScheduleStore, ScheduleStore};
