//! REST server exposing a session store to remote players.
//!
//! The server stores whatever it is sent. It does not check that a position
//! update comes from the seated player whose turn it is; that gate lives in
//! the clients.

use crate::record::{GameDocument, GameRecord};
use crate::store::{
    ClaimRequest, ClaimResponse, CreateResponse, PositionUpdate, SessionStore, StoreError,
    StoreErrorKind,
};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

type SharedStore = Arc<dyn SessionStore>;

/// A store failure rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            StoreErrorKind::NotFound => StatusCode::NOT_FOUND,
            StoreErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            StoreErrorKind::Decode => StatusCode::UNPROCESSABLE_ENTITY,
            StoreErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "Request failed");
        (status, self.0.message).into_response()
    }
}

/// Builds the router over `store`.
#[instrument(skip(store))]
pub fn router(store: SharedStore) -> Router {
    info!("Building store router");
    Router::new()
        .route("/games/{game_id}", get(get_game).put(put_game))
        .route("/games/{game_id}/create", post(create_game))
        .route("/games/{game_id}/claim", post(claim_slot))
        .route("/games/{game_id}/position", post(publish_position))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            debug!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(store)
}

/// Serves `store` on `host:port` until the process exits.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
#[instrument(skip(store))]
pub async fn serve(host: String, port: u16, store: SharedStore) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!("Session store listening on http://{}:{}/", host, port);
    axum::serve(listener, router(store)).await
}

#[instrument(skip(store))]
async fn get_game(
    State(store): State<SharedStore>,
    Path(game_id): Path<String>,
) -> Result<Json<GameDocument>, ApiError> {
    let record = store
        .fetch(&game_id)
        .await?
        .ok_or_else(|| StoreError::not_found(&game_id))?;
    Ok(Json(GameDocument::try_from(&record).map_err(StoreError::from)?))
}

#[instrument(skip(store, doc))]
async fn put_game(
    State(store): State<SharedStore>,
    Path(game_id): Path<String>,
    Json(doc): Json<GameDocument>,
) -> Result<StatusCode, ApiError> {
    store.write(&game_id, &GameRecord::from(doc)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(store, doc))]
async fn create_game(
    State(store): State<SharedStore>,
    Path(game_id): Path<String>,
    Json(doc): Json<GameDocument>,
) -> Result<(StatusCode, Json<CreateResponse>), ApiError> {
    let created = store.create_if_absent(&game_id, &GameRecord::from(doc)).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(CreateResponse { created })))
}

#[instrument(skip(store, request), fields(session_id = %request.session_id, side = %request.side))]
async fn claim_slot(
    State(store): State<SharedStore>,
    Path(game_id): Path<String>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let outcome = store
        .claim_slot(&game_id, request.side, &request.session_id)
        .await?;
    let claimed = matches!(outcome, crate::store::ClaimOutcome::Claimed(_));
    let record = GameDocument::try_from(outcome.record()).map_err(StoreError::from)?;
    info!(claimed, "Claim handled");
    Ok(Json(ClaimResponse { claimed, record }))
}

#[instrument(skip(store, update), fields(status = %update.status))]
async fn publish_position(
    State(store): State<SharedStore>,
    Path(game_id): Path<String>,
    Json(update): Json<PositionUpdate>,
) -> Result<StatusCode, ApiError> {
    store.publish_position(&game_id, &update).await?;
    Ok(StatusCode::NO_CONTENT)
}
