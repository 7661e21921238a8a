//! Review of recorded mistakes

use chrono::{DateTime, Utc};

use super::mistakes::{MistakeLedger, MistakeRecord};
use super::progress::PracticeProgress;
use super::schedule::Scheduled;
use super::session::{PracticeEvent, PracticeSession, PracticeState, Transition};
use crate::board::{BoardState, MoveAttempt, ShakmatyBoard};
use crate::config::PracticeConfig;
use crate::error::Result;
use crate::study::OpeningStudy;
use crate::tree::Line;

/// Practice over one single-move line per due mistake, played from the
/// position before the mistake. Moving on is always explicit.
pub struct ReviewSession<B: BoardState = ShakmatyBoard> {
    study_id: String,
    queue: Vec<MistakeRecord>,
    session: PracticeSession<B>,
}

impl<B: BoardState> ReviewSession<B> {
    /// Mistakes whose node has since been deleted are left out.
    pub fn new(
        study: &OpeningStudy,
        ledger: &MistakeLedger,
        config: PracticeConfig,
        now: DateTime<Utc>,
    ) -> Result<(Self, Transition)> {
        let mut queue = Vec::new();
        let mut lines = Vec::new();
        for record in ledger.due_for_review(&study.id, now) {
            let Some(node) = study.moves.get_shared(record.node_id) else {
                tracing::debug!(node = %record.node_id, "mistake for a deleted move skipped");
                continue;
            };
            // The parent's stored position stands in for replaying the path.
            let start_fen = node
                .parent
                .and_then(|p| study.moves.get(p))
                .map(|p| p.fen.clone())
                .unwrap_or_else(|| study.root_fen.clone());
            lines.push(Line {
                moves: vec![node.clone()],
                start_fen,
                is_setup_line: false,
            });
            queue.push(record);
        }

        let (session, first) = PracticeSession::new(
            study.id.clone(),
            study.color,
            &study.root_fen,
            lines,
            PracticeProgress::default(),
            config,
        )?;
        Ok((
            Self {
                study_id: study.id.clone(),
                queue,
                session,
            },
            first,
        ))
    }

    pub fn session(&self) -> &PracticeSession<B> {
        &self.session
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn current(&self) -> Option<&MistakeRecord> {
        if self.queue.is_empty() {
            return None;
        }
        self.queue.get(self.session.line_index())
    }

    /// Mistakes not answered correctly yet in this review.
    pub fn remaining(&self) -> usize {
        self.session.progress().remaining(self.queue.len())
    }

    /// Wrong answers go to the ledger like any practice mistake; a correct
    /// answer extends the record's streak.
    pub fn attempt(
        &mut self,
        attempt: &MoveAttempt,
        ledger: &mut MistakeLedger,
        now: DateTime<Utc>,
    ) -> Transition {
        let line = self.session.line_index();
        let already_answered = self.session.progress().completed_lines.contains(&line);
        let transition = self.session.attempt_move(attempt);
        ledger.observe(&self.study_id, &transition.events, now);

        let answered = transition
            .events
            .iter()
            .any(|e| matches!(e, PracticeEvent::UserMove { .. }));
        if answered && !already_answered && self.session.state() == PracticeState::LineComplete {
            if let Some(record) = self.current() {
                let node_id = record.node_id;
                ledger.record_success(&self.study_id, node_id, now);
            }
        }
        transition
    }

    pub fn fire(&mut self, scheduled: &Scheduled) -> Transition {
        self.session.fire(scheduled)
    }

    /// `None` once no other mistake is left to answer.
    pub fn next(&mut self) -> Option<Transition> {
        if !self.has_other_pending() {
            return None;
        }
        self.session.next_line()
    }

    pub fn skip(&mut self) -> Option<Transition> {
        if !self.has_other_pending() {
            return None;
        }
        self.session.skip_line(self.session.line_index())
    }

    fn has_other_pending(&self) -> bool {
        let current = self.session.line_index();
        let progress = self.session.progress();
        (0..self.queue.len()).any(|i| {
            i != current
                && !progress.completed_lines.contains(&i)
                && !progress.skipped_lines.contains(&i)
        })
    }
}
