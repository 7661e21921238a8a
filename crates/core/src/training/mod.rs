//! Practice modes built on extracted lines

pub mod drill;
pub mod feedback;
pub mod hint;
pub mod mistakes;
pub mod progress;
pub mod review;
pub mod schedule;
pub mod session;

pub use drill::{DrillStats, SpeedDrill};
pub use feedback::{classify, MoveSound};
pub use hint::{Hint, HintLevel};
pub use mistakes::{review_interval, MistakeLedger, MistakeRecord};
pub use progress::PracticeProgress;
pub use review::ReviewSession;
pub use schedule::{Continuation, Scheduled, Ticket};
pub use session::{PracticeEvent, PracticeSession, PracticeSnapshot, PracticeState, Transition};
