use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use repertoire_core::{
    export_pgn, import_pgn, BoardState, Cursor, MistakeLedger, MoveAttempt, Nag, NodeId,
    OpeningStudy, ShakmatyBoard, Shape, Side,
};

use crate::error::{ApiError, ApiResult};
use crate::{lock, AppState};

pub mod training;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/studies", get(list_studies).post(create_study))
        .route("/api/studies/import", post(import_studies))
        .route("/api/studies/:id", get(get_study).delete(delete_study))
        .route("/api/studies/:id/pgn", get(export_study))
        .route("/api/studies/:id/lines", get(study_lines))
        .route("/api/studies/:id/position", get(position))
        .route("/api/studies/:id/moves", post(play_move))
        .route("/api/studies/:id/practice-start", put(set_practice_start))
        .route("/api/studies/:id/nodes/:node_id", delete(delete_node))
        .route("/api/studies/:id/nodes/:node_id/promote", post(promote))
        .route("/api/studies/:id/nodes/:node_id/comment", put(set_comment))
        .route("/api/studies/:id/nodes/:node_id/nags", put(set_nags))
        .route("/api/studies/:id/nodes/:node_id/shapes", put(set_shapes))
        .route("/api/studies/:id/practice", post(training::start_practice))
        .route("/api/studies/:id/drill", post(training::start_drill))
        .route("/api/studies/:id/review", post(training::start_review))
        .route(
            "/api/studies/:id/mistakes",
            get(training::due_mistakes).delete(training::clear_mistakes),
        )
        .route(
            "/api/sessions/:sid",
            get(training::session_state).delete(training::end_session),
        )
        .route("/api/sessions/:sid/move", post(training::session_move))
        .route("/api/sessions/:sid/reset", post(training::session_reset))
        .route("/api/sessions/:sid/select", post(training::session_select))
        .route("/api/sessions/:sid/next", post(training::session_next))
        .route("/api/sessions/:sid/skip", post(training::session_skip))
        .route("/api/sessions/:sid/shuffle", post(training::session_shuffle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize)]
pub struct StudySummary {
    pub id: String,
    pub name: String,
    pub color: Side,
    pub move_count: usize,
    pub line_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&OpeningStudy> for StudySummary {
    fn from(study: &OpeningStudy) -> Self {
        Self {
            id: study.id.clone(),
            name: study.name.clone(),
            color: study.color,
            move_count: study.moves.len(),
            line_count: study.lines().len(),
            updated_at: study.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct NewStudy {
    pub name: String,
    pub color: Side,
    pub root_fen: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct ImportRequest {
    pub pgn: String,
    pub color: Side,
}

#[derive(Deserialize)]
pub struct PlayMoveRequest {
    #[serde(default)]
    pub path: Vec<NodeId>,
    pub uci: String,
}

#[derive(Serialize)]
pub struct PlayMoveResponse {
    pub path: Vec<NodeId>,
    pub study: OpeningStudy,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct NagsRequest {
    pub nags: BTreeSet<Nag>,
}

#[derive(Deserialize)]
pub struct ShapesRequest {
    pub shapes: Vec<Shape>,
}

#[derive(Deserialize)]
pub struct PracticeStartRequest {
    pub node_id: Option<NodeId>,
}

#[derive(Serialize)]
pub struct LineView {
    pub index: usize,
    pub is_setup_line: bool,
    pub start_fen: String,
    pub sans: Vec<String>,
    pub ucis: Vec<String>,
}

#[derive(Deserialize)]
pub struct PositionQuery {
    /// Comma-separated node ids from the root.
    #[serde(default)]
    pub path: String,
}

#[derive(Serialize)]
pub struct PositionView {
    pub path: Vec<NodeId>,
    pub fen: String,
    pub turn: Side,
    pub is_check: bool,
    pub last_move: Option<String>,
    pub comment: Option<String>,
    pub dests: BTreeMap<String, Vec<String>>,
}

pub(crate) fn parse_uci(uci: &str) -> ApiResult<MoveAttempt> {
    MoveAttempt::from_uci(uci.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("not a UCI move: {}", uci)))
}

pub(crate) fn load_study(state: &AppState, id: &str) -> ApiResult<OpeningStudy> {
    lock(&state.store)
        .load_study(id)?
        .ok_or_else(|| ApiError::NotFound(format!("study {}", id)))
}

/// Loads the study, applies `edit`, and saves it if the edit succeeded.
fn edit_study<T>(
    state: &AppState,
    id: &str,
    edit: impl FnOnce(&mut OpeningStudy) -> ApiResult<T>,
) -> ApiResult<(OpeningStudy, T)> {
    let store = lock(&state.store);
    let mut study = store
        .load_study(id)?
        .ok_or_else(|| ApiError::NotFound(format!("study {}", id)))?;
    let out = edit(&mut study)?;
    study.touch();
    store.save_study(&study)?;
    Ok((study, out))
}

pub async fn list_studies(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<StudySummary>>> {
    let studies = lock(&state.store).list_studies()?;
    Ok(Json(studies.iter().map(StudySummary::from).collect()))
}

pub async fn create_study(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewStudy>,
) -> ApiResult<impl IntoResponse> {
    let mut study = OpeningStudy::new(req.name, req.color, req.root_fen.as_deref())?;
    study.description = req.description;
    lock(&state.store).save_study(&study)?;
    tracing::info!(study = %study.id, name = %study.name, "study created");
    Ok((StatusCode::CREATED, Json(study)))
}

pub async fn import_studies(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<impl IntoResponse> {
    let studies = import_pgn(&req.pgn, req.color)?;
    let store = lock(&state.store);
    for study in &studies {
        store.save_study(study)?;
    }
    tracing::info!(count = studies.len(), "studies imported");
    let summaries: Vec<StudySummary> = studies.iter().map(StudySummary::from).collect();
    Ok((StatusCode::CREATED, Json(summaries)))
}

pub async fn get_study(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OpeningStudy>> {
    Ok(Json(load_study(&state, &id)?))
}

pub async fn delete_study(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    lock(&state.sessions).retain(|_, live| live.study_id() != id);
    let store = lock(&state.store);
    if store.load_study(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("study {}", id)));
    }
    store.delete_study(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_study(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = load_study(&state, &id)?;
    Ok(([(header::CONTENT_TYPE, "application/x-chess-pgn")], export_pgn(&study)))
}

pub async fn study_lines(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<LineView>>> {
    let study = load_study(&state, &id)?;
    let lines = study
        .lines()
        .iter()
        .enumerate()
        .map(|(index, line)| LineView {
            index,
            is_setup_line: line.is_setup_line,
            start_fen: line.start_fen.clone(),
            sans: line.sans().iter().map(|s| s.to_string()).collect(),
            ucis: line.ucis().iter().map(|u| u.to_string()).collect(),
        })
        .collect();
    Ok(Json(lines))
}

pub async fn position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PositionQuery>,
) -> ApiResult<Json<PositionView>> {
    let study = load_study(&state, &id)?;
    let path = query
        .path
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<NodeId>()
                .map_err(|_| ApiError::BadRequest(format!("bad node id: {}", s)))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let mut cursor = Cursor::at(path);
    cursor.revalidate(&study.moves);
    let board: ShakmatyBoard = cursor.board(&study.moves, &study.root_fen)?;
    let dests = board
        .all_destinations()
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.iter().map(|sq| sq.to_string()).collect()))
        .collect();

    Ok(Json(PositionView {
        path: cursor.path().to_vec(),
        fen: board.fen(),
        turn: board.turn(),
        is_check: board.is_check(),
        last_move: cursor
            .last_move(&study.moves)
            .map(|(from, to)| format!("{}{}", from, to)),
        comment: cursor.current(&study.moves).and_then(|n| n.comment.clone()),
        dests,
    }))
}

pub async fn play_move(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PlayMoveRequest>,
) -> ApiResult<Json<PlayMoveResponse>> {
    let attempt = parse_uci(&req.uci)?;
    let (study, path) = edit_study(&state, &id, |study| {
        Ok(study.play_move(&req.path, &attempt)?)
    })?;
    Ok(Json(PlayMoveResponse { path, study }))
}

pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, NodeId)>,
) -> ApiResult<Json<OpeningStudy>> {
    let (study, ()) = edit_study(&state, &id, |study| {
        if !study.moves.contains(node_id) {
            return Err(ApiError::NotFound(format!("node {}", node_id)));
        }
        study.delete_node(node_id);
        Ok(())
    })?;

    let store = lock(&state.store);
    let mut ledger = MistakeLedger::new();
    ledger.load_from(&store, &id)?;
    if ledger.prune(&id, &study.moves) > 0 {
        ledger.save_to(&store, &id)?;
    }
    Ok(Json(study))
}

pub async fn promote(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, NodeId)>,
) -> ApiResult<Json<OpeningStudy>> {
    let (study, ()) = edit_study(&state, &id, |study| Ok(study.promote_to_main_line(node_id)?))?;
    Ok(Json(study))
}

pub async fn set_comment(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, NodeId)>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Json<OpeningStudy>> {
    let comment = req.comment.filter(|c| !c.trim().is_empty());
    let (study, ()) = edit_study(&state, &id, |study| Ok(study.set_comment(node_id, comment)?))?;
    Ok(Json(study))
}

pub async fn set_nags(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, NodeId)>,
    Json(req): Json<NagsRequest>,
) -> ApiResult<Json<OpeningStudy>> {
    let (study, ()) = edit_study(&state, &id, |study| Ok(study.set_nags(node_id, req.nags)?))?;
    Ok(Json(study))
}

pub async fn set_shapes(
    State(state): State<Arc<AppState>>,
    Path((id, node_id)): Path<(String, NodeId)>,
    Json(req): Json<ShapesRequest>,
) -> ApiResult<Json<OpeningStudy>> {
    let (study, ()) = edit_study(&state, &id, |study| Ok(study.set_shapes(node_id, req.shapes)?))?;
    Ok(Json(study))
}

pub async fn set_practice_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PracticeStartRequest>,
) -> ApiResult<Json<OpeningStudy>> {
    let (study, ()) = edit_study(&state, &id, |study| Ok(study.set_practice_start(req.node_id)?))?;
    Ok(Json(study))
}
