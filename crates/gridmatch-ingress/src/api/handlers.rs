use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use gridmatch_matchcore::BookSnapshot;
use gridmatch_types::{
    EpochKey, GroupId, Match, MarketId, MeterReading, Order, OrderId, OrderRequest, OrderStatus,
    SortRole, SortedResult, constants,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::error::ApiError;
use super::state::AppState;

/// Reply to an accepted submission.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub remaining: u64,
    pub matches: Vec<Match>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReadingsRequest {
    pub round: u64,
    pub group: u32,
    pub readings: Vec<MeterReading>,
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(raw).ok_or_else(|| ApiError::BadRequest(format!("malformed order id {raw}")))
}

pub async fn submit_order(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let handle = state.engine.submit(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            order_id: handle.order.id,
            status: handle.order.status,
            remaining: handle.order.remaining,
            matches: handle.matches,
        }),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    state
        .engine
        .order(&order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id}")))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(state.engine.cancel(&order_id).await?))
}

pub async fn book(
    State(state): State<AppState>,
    Path(market): Path<String>,
) -> Json<BookSnapshot> {
    Json(state.engine.book_snapshot(&MarketId::new(market)).await)
}

pub async fn sorted_result(
    State(state): State<AppState>,
    Path((round, group, role)): Path<(u64, u32, String)>,
) -> Result<Json<SortedResult>, ApiError> {
    let role = SortRole::parse(&role)
        .ok_or_else(|| ApiError::BadRequest(format!("role must be buyer or seller, got {role}")))?;
    let key = EpochKey::new(round, GroupId(group), role);
    state
        .coordinator
        .sorted_result(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no sorted result for {key}")))
}

pub async fn stage_readings(
    State(state): State<AppState>,
    Json(request): Json<StageReadingsRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if request.readings.is_empty() {
        return Err(ApiError::BadRequest("readings must not be empty".into()));
    }
    let staged = request.readings.len();
    let group = GroupId(request.group);
    let total = state
        .coordinator
        .stage_readings(request.round, group, request.readings)
        .await?;
    info!(round = request.round, group = %group, staged, total, "Meter readings staged");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "staged": staged, "total": total })),
    ))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "engine": constants::ENGINE_NAME,
        "version": constants::VERSION,
        "defaultMarket": state.engine.default_market(),
        "subscribers": state.hub.subscriber_count(),
        "pendingEpochs": state.coordinator.pending_keys().len(),
    }))
}
