//! Timed speed drill over a practice session

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

use super::progress::PracticeProgress;
use super::schedule::{Continuation, Scheduled};
use super::session::{PracticeEvent, PracticeSession, PracticeState, Transition};
use crate::board::{BoardState, MoveAttempt, ShakmatyBoard};
use crate::config::PracticeConfig;
use crate::error::Result;
use crate::study::OpeningStudy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrillStats {
    pub correct_moves: u32,
    pub wrong_moves: u32,
    pub elapsed_ms: u64,
    /// Percentage of correct moves, 0 before any move.
    pub accuracy: f64,
    /// 0 before the first correct move.
    pub average_time_per_move_ms: f64,
}

/// Runs through every line in practice order against the clock. The clock
/// starts with the first user move and stops when the last line is done.
pub struct SpeedDrill<B: BoardState = ShakmatyBoard> {
    session: PracticeSession<B>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    correct_moves: u32,
    wrong_moves: u32,
}

impl SpeedDrill<ShakmatyBoard> {
    pub fn from_study(study: &OpeningStudy, config: PracticeConfig) -> Result<(Self, Transition)> {
        let (session, first) =
            PracticeSession::from_study(study, PracticeProgress::default(), config)?;
        Ok(Self::new(session, first))
    }
}

impl<B: BoardState> SpeedDrill<B> {
    pub fn new(session: PracticeSession<B>, first: Transition) -> (Self, Transition) {
        let mut drill = Self {
            session,
            started_at: None,
            finished_at: None,
            correct_moves: 0,
            wrong_moves: 0,
        };
        let first = drill.track(first);
        (drill, first)
    }

    pub fn session(&self) -> &PracticeSession<B> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.finished_at.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn elapsed_ms(&self) -> u64 {
        let elapsed = match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => return 0,
        };
        elapsed.as_millis() as u64
    }

    pub fn stats(&self) -> DrillStats {
        let elapsed_ms = self.elapsed_ms();
        let total = self.correct_moves + self.wrong_moves;
        let accuracy = if total == 0 {
            0.0
        } else {
            self.correct_moves as f64 / total as f64 * 100.0
        };
        let average_time_per_move_ms = if self.correct_moves == 0 {
            0.0
        } else {
            elapsed_ms as f64 / self.correct_moves as f64
        };
        DrillStats {
            correct_moves: self.correct_moves,
            wrong_moves: self.wrong_moves,
            elapsed_ms,
            accuracy,
            average_time_per_move_ms,
        }
    }

    pub fn attempt_move(&mut self, attempt: &MoveAttempt) -> Transition {
        if self.finished_at.is_none()
            && self.started_at.is_none()
            && self.session.state() == PracticeState::Playing
            && self.session.is_user_turn()
        {
            self.started_at = Some(Instant::now());
        }
        let transition = self.session.attempt_move(attempt);
        self.track(transition)
    }

    pub fn fire(&mut self, scheduled: &Scheduled) -> Transition {
        let transition = self.session.fire(scheduled);
        self.track(transition)
    }

    pub fn run_to_idle(&mut self, first: Transition) -> Vec<PracticeEvent> {
        let mut events = first.events;
        let mut queue: VecDeque<Scheduled> = first.scheduled.into();
        while let Some(next) = queue.pop_front() {
            let transition = self.fire(&next);
            events.extend(transition.events);
            queue.extend(transition.scheduled);
        }
        events
    }

    /// Zeroes the clock and counters and starts over from the first line.
    pub fn reset(&mut self) -> Transition {
        self.started_at = None;
        self.finished_at = None;
        self.correct_moves = 0;
        self.wrong_moves = 0;
        self.session.clear_progress();
        let transition = self.session.restart_from_first();
        self.track(transition)
    }

    /// Counts moves and schedules the advance to the next line after each
    /// completion except the last.
    fn track(&mut self, mut transition: Transition) -> Transition {
        let mut completed = false;
        for event in &transition.events {
            match event {
                PracticeEvent::UserMove { .. } => self.correct_moves += 1,
                PracticeEvent::WrongMove { .. } => self.wrong_moves += 1,
                PracticeEvent::LineComplete { .. } | PracticeEvent::LineAbandoned { .. } => {
                    completed = true
                }
                _ => {}
            }
        }
        if !completed || self.session.state() != PracticeState::LineComplete {
            return transition;
        }

        if self.session.is_last_in_order() {
            if self.started_at.is_some() && self.finished_at.is_none() {
                self.finished_at = Some(Instant::now());
            }
            let stats = self.stats();
            tracing::info!(
                correct = stats.correct_moves,
                wrong = stats.wrong_moves,
                elapsed_ms = stats.elapsed_ms,
                "speed drill finished"
            );
        } else {
            transition.scheduled.push(Scheduled {
                ticket: self.session.ticket(),
                delay: self.session.config().drill_advance_delay(),
                action: Continuation::AdvanceLine,
            });
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Side;

    fn attempt(uci: &str) -> MoveAttempt {
        MoveAttempt::from_uci(uci).unwrap()
    }

    fn study() -> OpeningStudy {
        let mut study = OpeningStudy::new("Drill", Side::White, None).unwrap();
        let e4 = study.play_move(&[], &attempt("e2e4")).unwrap();
        let e5 = study.play_move(&e4, &attempt("e7e5")).unwrap();
        study.play_move(&e5, &attempt("g1f3")).unwrap();
        study.play_move(&[], &attempt("d2d4")).unwrap();
        study
    }

    #[test]
    fn test_stats_are_zero_before_any_move() {
        let (drill, _) = SpeedDrill::from_study(&study(), PracticeConfig::default()).unwrap();
        let stats = drill.stats();
        assert_eq!(stats.accuracy, 0.0);
        assert_eq!(stats.average_time_per_move_ms, 0.0);
        assert_eq!(stats.elapsed_ms, 0);
        assert!(!drill.is_running());
    }

    #[test]
    fn test_drill_runs_through_all_lines() {
        let (mut drill, first) =
            SpeedDrill::from_study(&study(), PracticeConfig::default()).unwrap();
        drill.run_to_idle(first);

        let t = drill.attempt_move(&attempt("a2a3"));
        drill.run_to_idle(t);
        assert!(drill.is_running());

        for uci in ["e2e4", "g1f3"] {
            let t = drill.attempt_move(&attempt(uci));
            drill.run_to_idle(t);
        }
        // advanced automatically to the second line
        assert_eq!(drill.session().line_index(), 1);
        assert!(drill.is_running());

        let t = drill.attempt_move(&attempt("d2d4"));
        let events = drill.run_to_idle(t);
        assert!(events.contains(&PracticeEvent::AllLinesComplete));
        assert!(drill.is_finished());

        let stats = drill.stats();
        assert_eq!(stats.correct_moves, 3);
        assert_eq!(stats.wrong_moves, 1);
        assert_eq!(stats.accuracy, 75.0);
    }

    #[test]
    fn test_reset_starts_over() {
        let (mut drill, first) =
            SpeedDrill::from_study(&study(), PracticeConfig::default()).unwrap();
        drill.run_to_idle(first);
        let t = drill.attempt_move(&attempt("e2e4"));
        drill.run_to_idle(t);

        let t = drill.reset();
        drill.run_to_idle(t);
        assert_eq!(drill.stats().correct_moves, 0);
        assert_eq!(drill.elapsed_ms(), 0);
        assert_eq!(drill.session().line_index(), 0);
        assert_eq!(drill.session().move_index(), 0);
        assert!(drill.session().progress().completed_lines.is_empty());
    }
}
