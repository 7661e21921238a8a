//! Practice session state machine
//!
//! Drives one line at a time: opponent moves are played automatically (as
//! scheduled continuations), user moves are validated against the expected
//! continuation by UCI, and wrong attempts escalate the hint level.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::feedback::{classify, MoveSound};
use super::hint::{Hint, HintLevel};
use super::progress::PracticeProgress;
use super::schedule::{Continuation, Scheduled, Ticket};
use crate::board::{BoardState, MoveAttempt, ShakmatyBoard, Side};
use crate::config::PracticeConfig;
use crate::error::{Error, Result};
use crate::study::OpeningStudy;
use crate::tree::{shuffled_order, Line, MoveNode, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeState {
    Playing,
    LineComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PracticeEvent {
    LineStarted {
        line: usize,
    },
    UserMove {
        line: usize,
        node_id: NodeId,
        uci: String,
        san: String,
        sound: MoveSound,
    },
    OpponentMove {
        line: usize,
        node_id: NodeId,
        uci: String,
        san: String,
        sound: MoveSound,
    },
    WrongMove {
        line: usize,
        /// The node the user should have played.
        node_id: NodeId,
        expected_uci: String,
        attempted_uci: String,
        hint: HintLevel,
    },
    LineComplete {
        line: usize,
    },
    AllLinesComplete,
    /// A stored move could not be replayed; the line cannot continue.
    LineAbandoned {
        line: usize,
    },
    FeedbackCleared,
}

impl PracticeEvent {
    pub fn sound(&self) -> Option<MoveSound> {
        match self {
            PracticeEvent::UserMove { sound, .. } | PracticeEvent::OpponentMove { sound, .. } => {
                Some(*sound)
            }
            PracticeEvent::WrongMove { .. } => Some(MoveSound::Wrong),
            _ => None,
        }
    }
}

/// Result of one input: what happened, and what should happen later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub events: Vec<PracticeEvent>,
    pub scheduled: Vec<Scheduled>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.scheduled.is_empty()
    }

    pub fn extend(&mut self, other: Transition) {
        self.events.extend(other.events);
        self.scheduled.extend(other.scheduled);
    }

    fn event(&mut self, event: PracticeEvent) {
        self.events.push(event);
    }

    fn schedule(&mut self, scheduled: Scheduled) {
        self.scheduled.push(scheduled);
    }
}

/// Read model for rendering a session.
#[derive(Debug, Clone, Serialize)]
pub struct PracticeSnapshot {
    pub study_id: String,
    pub state: PracticeState,
    pub user_side: Side,
    pub line_index: usize,
    pub total_lines: usize,
    pub order: Vec<usize>,
    pub move_index: usize,
    pub line_length: usize,
    pub is_setup_line: bool,
    pub fen: String,
    pub turn: Side,
    pub is_check: bool,
    pub last_move: Option<String>,
    pub hint: Hint,
    pub wrong_flag: bool,
    pub line_wrong_attempts: u32,
    pub completion_percent: f64,
    pub progress: PracticeProgress,
}

pub struct PracticeSession<B: BoardState = ShakmatyBoard> {
    study_id: String,
    user_side: Side,
    root_fen: String,
    lines: Vec<Line>,
    order: Vec<usize>,
    progress: PracticeProgress,
    config: PracticeConfig,
    board: B,
    line: usize,
    move_index: usize,
    state: PracticeState,
    hint_level: HintLevel,
    line_wrong_attempts: u32,
    wrong_flag: bool,
    generation: u64,
    feedback_seq: u64,
}

impl PracticeSession<ShakmatyBoard> {
    pub fn from_study(
        study: &OpeningStudy,
        progress: PracticeProgress,
        config: PracticeConfig,
    ) -> Result<(Self, Transition)> {
        Self::new(
            study.id.clone(),
            study.color,
            &study.root_fen,
            study.lines(),
            progress,
            config,
        )
    }
}

impl<B: BoardState> PracticeSession<B> {
    /// Starts at the saved line index when it is still valid. Zero lines is
    /// a valid, idle session.
    pub fn new(
        study_id: impl Into<String>,
        user_side: Side,
        root_fen: &str,
        lines: Vec<Line>,
        mut progress: PracticeProgress,
        config: PracticeConfig,
    ) -> Result<(Self, Transition)> {
        let board = B::from_fen(root_fen)?;
        progress.clamp_to(lines.len());
        let start = progress.current_line_index;
        let mut session = Self {
            study_id: study_id.into(),
            user_side,
            root_fen: root_fen.to_string(),
            order: (0..lines.len()).collect(),
            lines,
            progress,
            config,
            board,
            line: 0,
            move_index: 0,
            state: PracticeState::Playing,
            hint_level: HintLevel::None,
            line_wrong_attempts: 0,
            wrong_flag: false,
            generation: 0,
            feedback_seq: 0,
        };
        let transition = if session.lines.is_empty() {
            tracing::debug!(study = %session.study_id, "nothing to practice");
            Transition::default()
        } else {
            session.enter_line(start)
        };
        Ok((session, transition))
    }

    pub fn study_id(&self) -> &str {
        &self.study_id
    }

    pub fn user_side(&self) -> Side {
        self.user_side
    }

    pub fn state(&self) -> PracticeState {
        self.state
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn line_index(&self) -> usize {
        self.line
    }

    pub fn current_line(&self) -> Option<&Line> {
        self.lines.get(self.line)
    }

    pub fn move_index(&self) -> usize {
        self.move_index
    }

    pub fn progress(&self) -> &PracticeProgress {
        &self.progress
    }

    pub fn config(&self) -> &PracticeConfig {
        &self.config
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn hint_level(&self) -> HintLevel {
        self.hint_level
    }

    pub fn wrong_flag(&self) -> bool {
        self.wrong_flag
    }

    pub fn line_wrong_attempts(&self) -> u32 {
        self.line_wrong_attempts
    }

    /// The node the user (or the opponent) has to play next.
    pub fn expected_move(&self) -> Option<&MoveNode> {
        match self.state {
            PracticeState::Playing => self.current_line()?.get(self.move_index),
            PracticeState::LineComplete => None,
        }
    }

    pub fn is_user_turn(&self) -> bool {
        self.board.turn() == self.user_side
    }

    pub fn hint(&self) -> Hint {
        if self.hint_level == HintLevel::None {
            return Hint::none();
        }
        match self.expected_move().and_then(MoveNode::attempt) {
            Some(expected) => Hint::reveal(self.hint_level, &expected),
            None => Hint::none(),
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            line: self.line,
            move_index: self.move_index,
            feedback_seq: self.feedback_seq,
        }
    }

    pub fn snapshot(&self) -> PracticeSnapshot {
        let line = self.current_line();
        let last_move = self
            .move_index
            .checked_sub(1)
            .and_then(|i| line?.get(i))
            .map(|m| m.uci.clone());
        PracticeSnapshot {
            study_id: self.study_id.clone(),
            state: self.state,
            user_side: self.user_side,
            line_index: self.line,
            total_lines: self.lines.len(),
            order: self.order.clone(),
            move_index: self.move_index,
            line_length: line.map_or(0, Line::len),
            is_setup_line: line.is_some_and(|l| l.is_setup_line),
            fen: self.board.fen(),
            turn: self.board.turn(),
            is_check: self.board.is_check(),
            last_move,
            hint: self.hint(),
            wrong_flag: self.wrong_flag,
            line_wrong_attempts: self.line_wrong_attempts,
            completion_percent: self.progress.completion_percent(self.lines.len()),
            progress: self.progress.clone(),
        }
    }

    /// Validates a user move against the expected continuation.
    ///
    /// Input that arrives while the line is complete or while an opponent
    /// reply is pending is ignored.
    pub fn attempt_move(&mut self, attempt: &MoveAttempt) -> Transition {
        let mut transition = Transition::default();
        if self.state != PracticeState::Playing || !self.is_user_turn() {
            tracing::debug!(uci = %attempt.uci(), "move ignored, not the user's turn");
            return transition;
        }
        let Some(expected) = self
            .current_line()
            .and_then(|l| l.moves.get(self.move_index))
            .cloned()
        else {
            return transition;
        };

        let attempted_uci = attempt.uci();
        if attempted_uci == expected.uci {
            match self.board.play(attempt) {
                Ok(played) => {
                    self.move_index += 1;
                    self.hint_level = HintLevel::None;
                    self.wrong_flag = false;
                    self.feedback_seq += 1;
                    transition.event(PracticeEvent::UserMove {
                        line: self.line,
                        node_id: expected.id,
                        uci: played.uci.clone(),
                        san: played.san.clone(),
                        sound: classify(&played),
                    });
                    transition.extend(self.after_move());
                    return transition;
                }
                Err(e) => {
                    tracing::warn!(
                        uci = %expected.uci,
                        error = %e,
                        "expected move is not playable"
                    );
                }
            }
        }

        self.line_wrong_attempts += 1;
        self.progress.wrong_attempts += 1;
        self.wrong_flag = true;
        self.feedback_seq += 1;
        self.hint_level = self.hint_level.escalate(self.config.max_hint);
        transition.event(PracticeEvent::WrongMove {
            line: self.line,
            node_id: expected.id,
            expected_uci: expected.uci.clone(),
            attempted_uci,
            hint: self.hint_level,
        });
        transition.schedule(Scheduled {
            ticket: self.ticket(),
            delay: self.config.feedback_delay(),
            action: Continuation::ClearWrongFlag,
        });
        transition
    }

    /// Runs a continuation issued earlier. Stale tickets do nothing.
    pub fn fire(&mut self, scheduled: &Scheduled) -> Transition {
        let ticket = scheduled.ticket;
        if ticket.generation != self.generation || ticket.line != self.line {
            tracing::debug!(action = ?scheduled.action, "stale continuation dropped");
            return Transition::default();
        }
        match scheduled.action {
            Continuation::OpponentMove => {
                if self.state != PracticeState::Playing || ticket.move_index != self.move_index {
                    tracing::debug!("stale opponent move dropped");
                    return Transition::default();
                }
                self.play_opponent()
            }
            Continuation::ClearWrongFlag => {
                if ticket.feedback_seq != self.feedback_seq || !self.wrong_flag {
                    return Transition::default();
                }
                self.wrong_flag = false;
                Transition {
                    events: vec![PracticeEvent::FeedbackCleared],
                    scheduled: Vec::new(),
                }
            }
            Continuation::AdvanceLine => {
                if self.state != PracticeState::LineComplete {
                    return Transition::default();
                }
                self.next_line().unwrap_or_default()
            }
        }
    }

    /// Plays every continuation in `first` and whatever they schedule, in
    /// order and without waiting, until only user input can move things on.
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

    pub fn reset_line(&mut self) -> Transition {
        if self.lines.is_empty() {
            return Transition::default();
        }
        self.enter_line(self.line)
    }

    pub fn select_line(&mut self, index: usize) -> Option<Transition> {
        if index >= self.lines.len() {
            return None;
        }
        Some(self.enter_line(index))
    }

    /// Moves on to the next line in practice order that is neither completed
    /// nor skipped, wrapping around. When none is left, simply the next one.
    pub fn next_line(&mut self) -> Option<Transition> {
        let next = self.find_after(self.line, |i| {
            !self.progress.completed_lines.contains(&i) && !self.progress.skipped_lines.contains(&i)
        })?;
        Some(self.enter_line(next))
    }

    /// Records `index` as skipped and moves on.
    pub fn skip_line(&mut self, index: usize) -> Option<Transition> {
        if index >= self.lines.len() {
            return None;
        }
        self.progress.mark_skipped(index);
        let next = self.find_after(index, |i| {
            !self.progress.completed_lines.contains(&i) && !self.progress.skipped_lines.contains(&i)
        })?;
        Some(self.enter_line(next))
    }

    /// Random practice order; bookkeeping stays keyed by line index.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Transition {
        self.order = shuffled_order(self.lines.len(), rng);
        self.restart_in_order()
    }

    pub fn set_order(&mut self, order: Vec<usize>) -> Result<Transition> {
        let mut sorted = order.clone();
        sorted.sort_unstable();
        if sorted != (0..self.lines.len()).collect::<Vec<_>>() {
            return Err(Error::Validation(format!(
                "order must be a permutation of 0..{}",
                self.lines.len()
            )));
        }
        self.order = order;
        Ok(self.restart_in_order())
    }

    /// First line of the practice order.
    pub fn restart_from_first(&mut self) -> Transition {
        match self.order.first() {
            Some(&first) => self.enter_line(first),
            None => Transition::default(),
        }
    }

    /// Forgets completed and skipped lines.
    pub fn clear_progress(&mut self) {
        self.progress.completed_lines.clear();
        self.progress.skipped_lines.clear();
    }

    pub fn is_last_in_order(&self) -> bool {
        self.order.last() == Some(&self.line)
    }

    fn restart_in_order(&mut self) -> Transition {
        let pending = self
            .order
            .iter()
            .copied()
            .find(|i| {
                !self.progress.completed_lines.contains(i)
                    && !self.progress.skipped_lines.contains(i)
            });
        match pending {
            Some(index) => self.enter_line(index),
            None => self.restart_from_first(),
        }
    }

    /// Next index after `from` in practice order satisfying `wanted`,
    /// wrapping; falls back to the plain successor.
    fn find_after(&self, from: usize, wanted: impl Fn(usize) -> bool) -> Option<usize> {
        let len = self.order.len();
        if len == 0 {
            return None;
        }
        let start = self.order.iter().position(|i| *i == from).unwrap_or(len - 1);
        (1..=len)
            .map(|step| self.order[(start + step) % len])
            .find(|i| wanted(*i))
            .or(Some(self.order[(start + 1) % len]))
    }

    fn enter_line(&mut self, index: usize) -> Transition {
        self.generation += 1;
        self.line = index;
        self.move_index = 0;
        self.hint_level = HintLevel::None;
        self.line_wrong_attempts = 0;
        self.wrong_flag = false;
        self.state = PracticeState::Playing;
        self.progress.current_line_index = index;

        let mut transition = Transition::default();
        transition.event(PracticeEvent::LineStarted { line: index });

        let start_fen = self
            .lines
            .get(index)
            .map(|l| l.start_fen.clone())
            .unwrap_or_else(|| self.root_fen.clone());
        if let Err(e) = self.board.set_fen(&start_fen) {
            tracing::warn!(line = index, error = %e, "line start position is invalid");
            self.state = PracticeState::LineComplete;
            transition.event(PracticeEvent::LineAbandoned { line: index });
            return transition;
        }
        transition.extend(self.after_move());
        transition
    }

    /// Completes the line when exhausted, otherwise schedules the opponent
    /// reply if the move is not the user's.
    fn after_move(&mut self) -> Transition {
        let mut transition = Transition::default();
        let line_len = self.current_line().map_or(0, Line::len);
        if self.move_index >= line_len {
            transition.extend(self.complete_line());
        } else if !self.is_user_turn() {
            transition.schedule(Scheduled {
                ticket: self.ticket(),
                delay: self.config.opponent_delay(),
                action: Continuation::OpponentMove,
            });
        }
        transition
    }

    fn play_opponent(&mut self) -> Transition {
        let mut transition = Transition::default();
        let Some(expected) = self
            .current_line()
            .and_then(|l| l.moves.get(self.move_index))
            .cloned()
        else {
            return transition;
        };
        let played = expected
            .attempt()
            .ok_or_else(|| Error::IllegalMove(expected.uci.clone()))
            .and_then(|attempt| self.board.play(&attempt));
        match played {
            Ok(played) => {
                self.move_index += 1;
                transition.event(PracticeEvent::OpponentMove {
                    line: self.line,
                    node_id: expected.id,
                    uci: played.uci.clone(),
                    san: played.san.clone(),
                    sound: classify(&played),
                });
                transition.extend(self.after_move());
            }
            Err(e) => {
                tracing::warn!(
                    uci = %expected.uci,
                    error = %e,
                    "stored opponent move is not playable"
                );
                self.state = PracticeState::LineComplete;
                transition.event(PracticeEvent::LineAbandoned { line: self.line });
            }
        }
        transition
    }

    fn complete_line(&mut self) -> Transition {
        let mut transition = Transition::default();
        self.state = PracticeState::LineComplete;
        self.hint_level = HintLevel::None;
        self.progress.last_practiced_at = Some(Utc::now());
        let newly = self.progress.mark_completed(self.line);
        tracing::info!(study = %self.study_id, line = self.line, "line complete");
        transition.event(PracticeEvent::LineComplete { line: self.line });
        if newly && self.progress.is_complete(self.lines.len()) {
            tracing::info!(study = %self.study_id, "all lines complete");
            transition.event(PracticeEvent::AllLinesComplete);
        }
        transition
    }
}
