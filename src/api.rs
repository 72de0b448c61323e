//! REST surface over the scheduling engine.
//!
//! Caller identity arrives in `x-actor-id` / `x-actor-role` headers set by a
//! trusted gateway; this service does not authenticate.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{StatusCode, request::Parts},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::auth::{Actor, Role};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, REQUESTS_IN_FLIGHT, REQUESTS_REJECTED_TOTAL};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Build the application router.
pub fn router(engine: Arc<Engine>, max_in_flight: usize) -> Router {
    let in_flight = Arc::new(Semaphore::new(max_in_flight));

    Router::new()
        .route("/health", get(health))
        .route("/availability", get(day_availability))
        .route("/tailors/{tailor_id}/availability", get(list_availability))
        .route(
            "/tailors/{tailor_id}/availability/{branch_id}/{day}",
            put(set_availability),
        )
        .route(
            "/tailors/{tailor_id}/availability/{branch_id}/{day}/deactivate",
            post(deactivate_availability),
        )
        .route("/appointments", post(book).get(list_appointments))
        .route(
            "/appointments/{id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{id}/status", axum::routing::patch(update_status))
        .route("/appointments/{id}/reschedule", post(reschedule))
        .route("/appointments/{id}/cancel", post(cancel))
        .route_layer(axum_middleware::from_fn(observability::track_requests))
        .layer(axum_middleware::from_fn_with_state(in_flight, limit_in_flight))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Unauthorized(&'static str),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

pub fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        EngineError::PreconditionFailed { .. } => StatusCode::BAD_REQUEST,
        EngineError::Conflict { .. } => StatusCode::CONFLICT,
        EngineError::Validation(_) | EngineError::LimitExceeded(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match &self {
            ApiError::Engine(e) => (status_for(e), e.kind(), e.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.to_string()),
        };
        if status.is_server_error() {
            tracing::error!("{detail}");
        }
        (
            status,
            Json(ErrorBody {
                error: kind.to_string(),
                detail,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Caller identity ──────────────────────────────────────────────

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
        let id = header(ACTOR_ID_HEADER)
            .ok_or(ApiError::Unauthorized("missing x-actor-id header"))?
            .parse::<Ulid>()
            .map_err(|_| ApiError::Unauthorized("x-actor-id is not a valid id"))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or(ApiError::Unauthorized("missing x-actor-role header"))?
            .parse::<Role>()
            .map_err(|_| ApiError::Unauthorized("x-actor-role is not a known role"))?;
        Ok(Actor::new(id, role))
    }
}

// ── Middleware ───────────────────────────────────────────────────

/// Shed load once `max_in_flight` requests are being served.
async fn limit_in_flight(State(in_flight): State<Arc<Semaphore>>, request: Request, next: Next) -> Response {
    let Ok(_permit) = in_flight.try_acquire_owned() else {
        tracing::warn!(path = %request.uri().path(), "in-flight limit reached, rejecting request");
        metrics::counter!(REQUESTS_REJECTED_TOTAL).increment(1);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "overloaded".into(),
                detail: "too many requests in flight".into(),
            }),
        )
            .into_response();
    };
    metrics::gauge!(REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    metrics::gauge!(REQUESTS_IN_FLIGHT).decrement(1.0);
    response
}

// ── Handlers ─────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    tailor_id: Ulid,
    branch_id: Ulid,
    date: NaiveDate,
}

async fn day_availability(State(engine): State<Arc<Engine>>, Query(q): Query<DayQuery>) -> Json<DaySlots> {
    Json(engine.available_slots(q.tailor_id, q.branch_id, q.date).await)
}

async fn list_availability(
    State(engine): State<Arc<Engine>>,
    _actor: Actor,
    Path(tailor_id): Path<Ulid>,
) -> Json<Vec<TailorAvailability>> {
    Json(engine.list_availability(tailor_id))
}

async fn set_availability(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path((tailor_id, branch_id, day)): Path<(Ulid, Ulid, DayOfWeek)>,
    Json(hours): Json<AvailabilityHours>,
) -> ApiResult<Json<TailorAvailability>> {
    let record = engine
        .set_availability(&actor, tailor_id, branch_id, day, hours)
        .await?;
    Ok(Json(record))
}

async fn deactivate_availability(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path((tailor_id, branch_id, day)): Path<(Ulid, Ulid, DayOfWeek)>,
) -> ApiResult<Json<TailorAvailability>> {
    let record = engine
        .deactivate_availability(&actor, tailor_id, branch_id, day)
        .await?;
    Ok(Json(record))
}

async fn book(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Json(request): Json<BookingRequest>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let appointment = engine.book(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn list_appointments(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Query(filter): Query<AppointmentFilter>,
) -> ApiResult<Json<AppointmentPage>> {
    Ok(Json(engine.list_appointments(&actor, &filter).await?))
}

async fn get_appointment(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path(id): Path<Ulid>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(engine.get_appointment(&actor, id).await?))
}

async fn update_appointment(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path(id): Path<Ulid>,
    Json(update): Json<AppointmentUpdate>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(engine.update_details(&actor, id, update).await?))
}

async fn delete_appointment(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path(id): Path<Ulid>,
) -> ApiResult<StatusCode> {
    engine.delete_appointment(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path(id): Path<Ulid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(engine.update_status(&actor, id, update).await?))
}

async fn reschedule(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path(id): Path<Ulid>,
    Json(request): Json<RescheduleRequest>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(engine.reschedule(&actor, id, request).await?))
}

async fn cancel(
    State(engine): State<Arc<Engine>>,
    actor: Actor,
    Path(id): Path<Ulid>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.cancel(&actor, id, request).await?;
    Ok(Json(json!({ "message": "Appointment cancelled successfully" })))
}
