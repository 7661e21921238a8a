//! Running sessions and their timers

use std::sync::Arc;

use chrono::Utc;
use rand::rng;
use serde::Serialize;

use repertoire_core::training::PracticeSnapshot;
use repertoire_core::{
    DrillStats, MistakeLedger, MoveAttempt, PracticeEvent, PracticeSession, ReviewSession,
    Scheduled, SpeedDrill, Transition,
};

use crate::error::{ApiError, ApiResult};
use crate::{lock, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Practice,
    Drill,
    Review,
}

pub enum LiveSession {
    Practice(PracticeSession),
    Drill(SpeedDrill),
    Review(ReviewSession),
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub kind: SessionKind,
    pub snapshot: PracticeSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drill: Option<DrillStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_remaining: Option<usize>,
    pub events: Vec<PracticeEvent>,
}

fn unsupported(kind: SessionKind, action: &str) -> ApiError {
    let message = format!("{} is not available in a {:?} session", action, kind);
    ApiError::BadRequest(message.to_lowercase())
}

impl LiveSession {
    pub fn kind(&self) -> SessionKind {
        match self {
            LiveSession::Practice(_) => SessionKind::Practice,
            LiveSession::Drill(_) => SessionKind::Drill,
            LiveSession::Review(_) => SessionKind::Review,
        }
    }

    fn session(&self) -> &PracticeSession {
        match self {
            LiveSession::Practice(s) => s,
            LiveSession::Drill(d) => d.session(),
            LiveSession::Review(r) => r.session(),
        }
    }

    pub fn study_id(&self) -> &str {
        self.session().study_id()
    }

    pub fn view(&self, session_id: &str, events: Vec<PracticeEvent>) -> SessionView {
        SessionView {
            session_id: session_id.to_string(),
            kind: self.kind(),
            snapshot: self.session().snapshot(),
            drill: match self {
                LiveSession::Drill(d) => Some(d.stats()),
                _ => None,
            },
            review_remaining: match self {
                LiveSession::Review(r) => Some(r.remaining()),
                _ => None,
            },
            events,
        }
    }

    /// Every mismatch lands in `ledger`, whatever the mode.
    pub fn attempt(&mut self, attempt: &MoveAttempt, ledger: &mut MistakeLedger) -> Transition {
        let now = Utc::now();
        let transition = match self {
            LiveSession::Practice(s) => s.attempt_move(attempt),
            LiveSession::Drill(d) => d.attempt_move(attempt),
            LiveSession::Review(r) => return r.attempt(attempt, ledger, now),
        };
        ledger.observe(self.study_id(), &transition.events, now);
        transition
    }

    pub fn fire(&mut self, scheduled: &Scheduled) -> Transition {
        match self {
            LiveSession::Practice(s) => s.fire(scheduled),
            LiveSession::Drill(d) => d.fire(scheduled),
            LiveSession::Review(r) => r.fire(scheduled),
        }
    }

    pub fn reset(&mut self) -> ApiResult<Transition> {
        match self {
            LiveSession::Practice(s) => Ok(s.reset_line()),
            LiveSession::Drill(d) => Ok(d.reset()),
            LiveSession::Review(_) => Err(unsupported(self.kind(), "reset")),
        }
    }

    pub fn select(&mut self, line: usize) -> ApiResult<Transition> {
        match self {
            LiveSession::Practice(s) => s
                .select_line(line)
                .ok_or_else(|| ApiError::NotFound(format!("line {}", line))),
            _ => Err(unsupported(self.kind(), "line selection")),
        }
    }

    pub fn next(&mut self) -> ApiResult<Option<Transition>> {
        match self {
            LiveSession::Practice(s) => Ok(s.next_line()),
            LiveSession::Review(r) => Ok(r.next()),
            LiveSession::Drill(_) => Err(unsupported(self.kind(), "next")),
        }
    }

    pub fn skip(&mut self, line: Option<usize>) -> ApiResult<Option<Transition>> {
        match self {
            LiveSession::Practice(s) => {
                let index = line.unwrap_or_else(|| s.line_index());
                Ok(s.skip_line(index))
            }
            LiveSession::Review(r) => Ok(r.skip()),
            LiveSession::Drill(_) => Err(unsupported(self.kind(), "skip")),
        }
    }

    pub fn shuffle(&mut self) -> ApiResult<Transition> {
        match self {
            LiveSession::Practice(s) => Ok(s.shuffle(&mut rng())),
            _ => Err(unsupported(self.kind(), "shuffle")),
        }
    }

    /// Progress worth saving; only plain practice is resumable.
    fn saved_progress(&self) -> Option<(&str, &repertoire_core::PracticeProgress)> {
        match self {
            LiveSession::Practice(s) => Some((s.study_id(), s.progress())),
            _ => None,
        }
    }
}

/// Saves resumable progress for the session, if it has any.
pub fn persist(state: &AppState, live: &LiveSession) {
    let Some((study_id, progress)) = live.saved_progress() else {
        return;
    };
    if let Err(err) = lock(&state.store).save_progress(study_id, progress) {
        tracing::warn!(study = study_id, error = %err, "failed to save progress");
    }
}

/// Runs each continuation after its delay. A ticket that went stale in the
/// meantime is a no-op inside `fire`.
pub fn dispatch(state: &Arc<AppState>, session_id: &str, scheduled: Vec<Scheduled>) {
    for item in scheduled {
        let state = Arc::clone(state);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(item.delay).await;
            let follow_up = {
                let mut sessions = lock(&state.sessions);
                let Some(live) = sessions.get_mut(&session_id) else {
                    return;
                };
                let transition = live.fire(&item);
                if !transition.events.is_empty() {
                    tracing::debug!(
                        session = %session_id,
                        events = transition.events.len(),
                        "continuation fired"
                    );
                    persist(&state, live);
                }
                transition.scheduled
            };
            dispatch(&state, &session_id, follow_up);
        });
    }
}
