//! Delayed continuations
//!
//! Sessions never sleep or spawn timers. Anything that should happen later
//! (an opponent reply, clearing the wrong-move flag, moving on to the next
//! line) is returned as a [`Scheduled`] value. The host waits `delay` and
//! hands it back to the session's `fire`, which ignores it when the session
//! has moved on since the ticket was issued.

use std::time::Duration;

/// Snapshot of the session position a continuation was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    /// Bumped every time a line is (re)entered.
    pub generation: u64,
    pub line: usize,
    pub move_index: usize,
    /// Bumped on every user move, so only the latest flag clear applies.
    pub feedback_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    OpponentMove,
    ClearWrongFlag,
    AdvanceLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub ticket: Ticket,
    pub delay: Duration,
    pub action: Continuation,
}
