//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchStatus, RosterEntry};
use crate::matchmaking::service::{default_display_name, MatchmakingError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/matches", get(list_matches_handler))
        .route("/matches/private", post(create_private_match_handler))
        .route("/matches/:match_id", get(match_status_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS configuration - `*` or a comma-separated origin list
fn cors_layer(client_origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return base.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    base.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
    queue_size: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_size = state.matchmaking.queue_size().await;

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        active_players: state.match_registry.total_players(),
        queue_size,
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

async fn list_matches_handler(State(state): State<AppState>) -> Json<Vec<MatchStatus>> {
    Json(state.match_registry.list())
}

async fn match_status_handler(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchStatus>, AppError> {
    state
        .match_registry
        .get(&match_id)
        .map(|handle| Json(handle.status()))
        .ok_or_else(|| AppError::NotFound(format!("match {}", match_id)))
}

#[derive(Deserialize)]
struct PrivatePlayer {
    user_id: Uuid,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct CreatePrivateMatchRequest {
    players: Vec<PrivatePlayer>,
}

#[derive(Serialize)]
struct CreatePrivateMatchResponse {
    match_id: Uuid,
    players: usize,
}

async fn create_private_match_handler(
    State(state): State<AppState>,
    Json(req): Json<CreatePrivateMatchRequest>,
) -> Result<(StatusCode, Json<CreatePrivateMatchResponse>), AppError> {
    let roster: Vec<RosterEntry> = req
        .players
        .into_iter()
        .map(|p| RosterEntry {
            user_id: p.user_id,
            display_name: p
                .display_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| default_display_name(p.user_id)),
        })
        .collect();
    let players = roster.len();

    let handle = state.matchmaking.create_private_match(roster)?;
    info!(match_id = %handle.id, players, "Private match created over HTTP");

    Ok((
        StatusCode::CREATED,
        Json(CreatePrivateMatchResponse {
            match_id: handle.id,
            players,
        }),
    ))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<MatchmakingError> for AppError {
    fn from(err: MatchmakingError) -> Self {
        match err {
            MatchmakingError::EmptyRoster | MatchmakingError::RosterTooLarge { .. } => {
                AppError::BadRequest(err.to_string())
            }
            MatchmakingError::UnknownMatch => AppError::NotFound(err.to_string()),
            MatchmakingError::AlreadyInMatch
            | MatchmakingError::AlreadyQueued
            | MatchmakingError::MatchClosed => AppError::Conflict(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    fn app() -> (AppState, Router) {
        let config = assert_ok!(Config::from_lookup(|_| None));
        let state = AppState::new(config);
        (state.clone(), build_router(state))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        assert_ok!(serde_json::from_slice(&bytes))
    }

    fn create_request(body: &str) -> Request<Body> {
        assert_ok!(Request::builder()
            .method(Method::POST)
            .uri("/matches/private")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_, router) = app();
        let request = assert_ok!(Request::builder().uri("/health").body(Body::empty()));
        let response = assert_ok!(router.oneshot(request).await);

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_matches"], 0);
    }

    #[tokio::test]
    async fn private_match_is_created_and_listed() {
        let (state, router) = app();
        let body = r#"{"players":[
            {"user_id":"00000000-0000-0000-0000-000000000001","display_name":"Ann"},
            {"user_id":"00000000-0000-0000-0000-000000000002"}
        ]}"#;

        let response = assert_ok!(router.clone().oneshot(create_request(body)).await);
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["players"], 2);

        let request = assert_ok!(Request::builder().uri("/matches").body(Body::empty()));
        let listing = body_json(assert_ok!(router.clone().oneshot(request).await)).await;
        assert_eq!(listing[0]["kind"], "private");
        assert_eq!(listing[0]["humans"], 2);

        // same players again
        let response = assert_ok!(router.oneshot(create_request(body)).await);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_json(response).await["error"].is_string());

        for status in state.match_registry.list() {
            if let Some(handle) = state.match_registry.get(&status.match_id) {
                assert_ok!(handle.send(crate::game::MatchCommand::Stop).await);
            }
        }
    }

    #[tokio::test]
    async fn empty_roster_is_a_bad_request() {
        let (_, router) = app();
        let response = assert_ok!(router.oneshot(create_request(r#"{"players":[]}"#)).await);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn roster_beyond_capacity_is_a_bad_request() {
        let (state, router) = app();
        let players: Vec<String> = (1..=state.config.game.capacity as u128 + 1)
            .map(|n| format!(r#"{{"user_id":"{}"}}"#, Uuid::from_u128(n)))
            .collect();
        let body = format!(r#"{{"players":[{}]}}"#, players.join(","));

        let response = assert_ok!(router.oneshot(create_request(&body)).await);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.match_registry.active_matches(), 0);
    }

    #[tokio::test]
    async fn unknown_match_is_not_found() {
        let (_, router) = app();
        let uri = format!("/matches/{}", Uuid::from_u128(77));
        let request = assert_ok!(Request::builder().uri(uri).body(Body::empty()));
        let response = assert_ok!(router.oneshot(request).await);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
