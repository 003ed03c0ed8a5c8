//! Timed-assessment engine: session lifecycle, countdown, answer collection
//! and grading.

pub mod answers;
pub mod clock;
pub mod deadline;
pub mod error;
pub mod grading;
pub mod manager;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ExamError;
pub use grading::PassPolicy;
pub use manager::SessionManager;
pub use session::{SessionStatus, SubmitTrigger};
