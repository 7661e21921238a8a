use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rand::rng;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use repertoire_core::{
    MistakeLedger, MistakeRecord, PracticeEvent, PracticeSession, ReviewSession, SpeedDrill,
    Transition,
};

use super::{load_study, parse_uci};
use crate::error::{ApiError, ApiResult};
use crate::live::{dispatch, persist, LiveSession, SessionView};
use crate::{lock, AppState};

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Deserialize, Default)]
pub struct StartPracticeRequest {
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub uci: String,
}

#[derive(Deserialize)]
pub struct SelectRequest {
    pub line: usize,
}

#[derive(Deserialize, Default)]
pub struct SkipRequest {
    pub line: Option<usize>,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Registers a new session and starts its timers. An earlier session of
/// the same kind for the same study is dropped.
fn register(state: &Arc<AppState>, live: LiveSession, first: Transition) -> SessionView {
    let session_id = Uuid::new_v4().to_string();
    let view = live.view(&session_id, first.events);
    tracing::info!(
        session = %session_id,
        study = live.study_id(),
        kind = ?live.kind(),
        "session started"
    );
    {
        let mut sessions = lock(&state.sessions);
        let before = sessions.len();
        sessions.retain(|_, other| {
            other.kind() != live.kind() || other.study_id() != live.study_id()
        });
        if sessions.len() < before {
            tracing::debug!(replaced = before - sessions.len(), "earlier session dropped");
        }
        sessions.insert(session_id.clone(), live);
    }
    dispatch(state, &session_id, first.scheduled);
    view
}

/// Runs `action` against a live session, saves progress, and schedules
/// whatever the transition asks for.
fn apply(
    state: &Arc<AppState>,
    session_id: &str,
    action: impl FnOnce(&mut LiveSession) -> ApiResult<Option<Transition>>,
) -> ApiResult<Json<SessionView>> {
    let (view, scheduled) = {
        let mut sessions = lock(&state.sessions);
        let live = sessions
            .get_mut(session_id)
            .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))?;
        let transition = action(live)?.unwrap_or_default();
        persist(state, live);
        (live.view(session_id, transition.events), transition.scheduled)
    };
    dispatch(state, session_id, scheduled);
    Ok(Json(view))
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn start_practice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    req: Option<Json<StartPracticeRequest>>,
) -> ApiResult<Json<SessionView>> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let study = load_study(&state, &id)?;
    let progress = lock(&state.store).load_progress(&id)?;

    let (mut session, mut first) =
        PracticeSession::from_study(&study, progress, state.practice.clone())?;
    if req.shuffle {
        first = session.shuffle(&mut rng());
    }
    Ok(Json(register(&state, LiveSession::Practice(session), first)))
}

pub async fn start_drill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let study = load_study(&state, &id)?;
    let (drill, first) = SpeedDrill::from_study(&study, state.practice.clone())?;
    Ok(Json(register(&state, LiveSession::Drill(drill), first)))
}

pub async fn start_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let study = load_study(&state, &id)?;
    let mut ledger = MistakeLedger::new();
    ledger.load_from(&lock(&state.store), &id)?;

    let (review, first): (ReviewSession, Transition) =
        ReviewSession::new(&study, &ledger, state.practice.clone(), Utc::now())?;
    if review.is_empty() {
        return Err(ApiError::BadRequest("no mistakes are due for review".to_string()));
    }
    Ok(Json(register(&state, LiveSession::Review(review), first)))
}

pub async fn due_mistakes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MistakeRecord>>> {
    let mut ledger = MistakeLedger::new();
    ledger.load_from(&lock(&state.store), &id)?;
    Ok(Json(ledger.due_for_review(&id, Utc::now())))
}

pub async fn clear_mistakes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    lock(&state.store).save_mistakes(&id, &[])?;
    tracing::info!(study = %id, "mistakes cleared");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_state(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let sessions = lock(&state.sessions);
    let live = sessions
        .get(&sid)
        .ok_or_else(|| ApiError::NotFound(format!("session {}", sid)))?;
    Ok(Json(live.view(&sid, Vec::new())))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<StatusCode> {
    match lock(&state.sessions).remove(&sid) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound(format!("session {}", sid))),
    }
}

pub async fn session_move(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<Json<SessionView>> {
    let attempt = parse_uci(&req.uci)?;
    apply(&state, &sid, |live| {
        let study_id = live.study_id().to_string();
        let store = lock(&state.store);
        let mut ledger = MistakeLedger::new();
        ledger.load_from(&store, &study_id)?;

        let transition = live.attempt(&attempt, &mut ledger);
        let missed = transition
            .events
            .iter()
            .any(|e| matches!(e, PracticeEvent::WrongMove { .. }));
        let answered = transition
            .events
            .iter()
            .any(|e| matches!(e, PracticeEvent::UserMove { .. }));
        if missed || (answered && matches!(live, LiveSession::Review(_))) {
            ledger.save_to(&store, &study_id)?;
        }
        Ok(Some(transition))
    })
}

pub async fn session_reset(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<Json<SessionView>> {
    apply(&state, &sid, |live| live.reset().map(Some))
}

pub async fn session_select(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Json(req): Json<SelectRequest>,
) -> ApiResult<Json<SessionView>> {
    apply(&state, &sid, |live| live.select(req.line).map(Some))
}

pub async fn session_next(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<Json<SessionView>> {
    apply(&state, &sid, |live| live.next())
}

pub async fn session_skip(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    req: Option<Json<SkipRequest>>,
) -> ApiResult<Json<SessionView>> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    apply(&state, &sid, |live| live.skip(req.line))
}

pub async fn session_shuffle(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
) -> ApiResult<Json<SessionView>> {
    apply(&state, &sid, |live| live.shuffle().map(Some))
}

#[cfg(test)]
mod tests {
    use super::super::router;
    use super::super::tests::call;
    use crate::{lock, AppState};
    use axum::http::StatusCode;
    use repertoire_core::{Database, KeyValueStore, PracticeConfig};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const PGN: &str = "[Event \"Ruy Lopez\"]\n\n1. e4 e5 2. Nf3 Nc6 3. Bb5 (3. Bc4 Bc5) *\n";

    fn fast_app_with_state() -> (axum::Router, Arc<AppState>) {
        let practice = PracticeConfig {
            opponent_delay_ms: 0,
            feedback_delay_ms: 0,
            drill_advance_delay_ms: 0,
            ..PracticeConfig::default()
        };
        let state = Arc::new(AppState::new(Database::open_in_memory().unwrap(), practice));
        (router(Arc::clone(&state)), state)
    }

    fn fast_app() -> axum::Router {
        fast_app_with_state().0
    }

    async fn import(app: &axum::Router) -> String {
        let (_, imported) = call(
            app,
            "POST",
            "/api/studies/import",
            Some(json!({"pgn": PGN, "color": "white"})),
        )
        .await;
        imported[0]["id"].as_str().unwrap().to_string()
    }

    /// Polls until the opponent has replied and it is the user's turn again.
    async fn settle(app: &axum::Router, sid: &str) -> Value {
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let (_, view) = call(app, "GET", &format!("/api/sessions/{}", sid), None).await;
            let snap = &view["snapshot"];
            if snap["state"] == "line_complete" || snap["turn"] == snap["user_side"] {
                return view;
            }
        }
        panic!("session never settled");
    }

    #[tokio::test]
    async fn test_practice_line_with_opponent_replies() {
        let app = fast_app();
        let id = import(&app).await;

        let practice_uri = format!("/api/studies/{}/practice", id);
        let (status, view) = call(&app, "POST", &practice_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["kind"], "practice");
        assert_eq!(view["snapshot"]["total_lines"], 2);
        let sid = view["session_id"].as_str().unwrap().to_string();

        for uci in ["e2e4", "g1f3", "f1b5"] {
            let (status, view) = call(
                &app,
                "POST",
                &format!("/api/sessions/{}/move", sid),
                Some(json!({ "uci": uci })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(view["events"][0]["type"], "user_move");
            settle(&app, &sid).await;
        }

        let (_, view) = call(&app, "GET", &format!("/api/sessions/{}", sid), None).await;
        assert_eq!(view["snapshot"]["state"], "line_complete");
        assert_eq!(view["snapshot"]["progress"]["completed_lines"], json!([0]));

        let (_, view) = call(&app, "POST", &format!("/api/sessions/{}/next", sid), None).await;
        assert_eq!(view["snapshot"]["line_index"], 1);
    }

    #[tokio::test]
    async fn test_wrong_move_is_recorded_and_reviewable() {
        let app = fast_app();
        let id = import(&app).await;
        let (_, view) = call(&app, "POST", &format!("/api/studies/{}/practice", id), None).await;
        let sid = view["session_id"].as_str().unwrap().to_string();

        let (_, view) = call(
            &app,
            "POST",
            &format!("/api/sessions/{}/move", sid),
            Some(json!({"uci": "d2d4"})),
        )
        .await;
        assert_eq!(view["events"][0]["type"], "wrong_move");
        assert_eq!(view["snapshot"]["wrong_flag"], true);

        let (_, due) = call(&app, "GET", &format!("/api/studies/{}/mistakes", id), None).await;
        assert_eq!(due[0]["expected_uci"], "e2e4");

        let review_uri = format!("/api/studies/{}/review", id);
        let (status, review) = call(&app, "POST", &review_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["review_remaining"], 1);
        let rid = review["session_id"].as_str().unwrap().to_string();

        let (_, view) = call(
            &app,
            "POST",
            &format!("/api/sessions/{}/move", rid),
            Some(json!({"uci": "e2e4"})),
        )
        .await;
        assert_eq!(view["snapshot"]["state"], "line_complete");

        let (_, due) = call(&app, "GET", &format!("/api/studies/{}/mistakes", id), None).await;
        assert_eq!(due, json!([]));
        let (status, _) = call(&app, "POST", &review_uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_practice_resumes_saved_progress() {
        let app = fast_app();
        let id = import(&app).await;
        let (_, view) = call(&app, "POST", &format!("/api/studies/{}/practice", id), None).await;
        let sid = view["session_id"].as_str().unwrap().to_string();

        let (_, view) = call(
            &app,
            "POST",
            &format!("/api/sessions/{}/skip", sid),
            Some(json!({})),
        )
        .await;
        assert_eq!(view["snapshot"]["line_index"], 1);
        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{}", sid), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, view) = call(&app, "POST", &format!("/api/studies/{}/practice", id), None).await;
        assert_eq!(view["snapshot"]["line_index"], 1);
        assert_eq!(view["snapshot"]["progress"]["skipped_lines"], json!([0]));
    }

    #[tokio::test]
    async fn test_drill_rejects_line_navigation() {
        let app = fast_app();
        let id = import(&app).await;
        let (_, view) = call(&app, "POST", &format!("/api/studies/{}/drill", id), None).await;
        assert_eq!(view["kind"], "drill");
        assert_eq!(view["drill"]["correct_moves"], 0);
        let sid = view["session_id"].as_str().unwrap();

        let (status, _) = call(&app, "POST", &format!("/api/sessions/{}/next", sid), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "GET", "/api/sessions/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_drill_wrong_move_is_recorded() {
        let app = fast_app();
        let id = import(&app).await;
        let (_, view) = call(&app, "POST", &format!("/api/studies/{}/drill", id), None).await;
        let sid = view["session_id"].as_str().unwrap().to_string();

        let (_, view) = call(
            &app,
            "POST",
            &format!("/api/sessions/{}/move", sid),
            Some(json!({"uci": "d2d4"})),
        )
        .await;
        assert_eq!(view["events"][0]["type"], "wrong_move");

        let (_, due) = call(&app, "GET", &format!("/api/studies/{}/mistakes", id), None).await;
        assert_eq!(due.as_array().unwrap().len(), 1);
        assert_eq!(due[0]["expected_uci"], "e2e4");
    }

    #[tokio::test]
    async fn test_new_session_replaces_earlier_one() {
        let app = fast_app();
        let id = import(&app).await;
        let practice_uri = format!("/api/studies/{}/practice", id);
        let (_, first) = call(&app, "POST", &practice_uri, None).await;
        let first_id = first["session_id"].as_str().unwrap().to_string();
        let (_, drill) = call(&app, "POST", &format!("/api/studies/{}/drill", id), None).await;
        let drill_id = drill["session_id"].as_str().unwrap().to_string();

        let (_, second) = call(&app, "POST", &practice_uri, None).await;
        assert_ne!(second["session_id"], first["session_id"]);

        let (status, _) = call(&app, "GET", &format!("/api/sessions/{}", first_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", &format!("/api/sessions/{}", drill_id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_state_does_not_save_progress() {
        let (app, state) = fast_app_with_state();
        let id = import(&app).await;
        let (_, view) = call(&app, "POST", &format!("/api/studies/{}/practice", id), None).await;
        let sid = view["session_id"].as_str().unwrap().to_string();

        let (status, view) = call(&app, "GET", &format!("/api/sessions/{}", sid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["events"], json!([]));

        let saved = lock(&state.store).inner().load(&format!("progress:{}", id)).unwrap();
        assert!(saved.is_none());
    }
}
