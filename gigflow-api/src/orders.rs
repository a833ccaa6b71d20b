use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gigflow_order::milestones::DeliverableSpec;
use gigflow_order::models::{CreateOrder, Order, OrderPatch, OrderStatus};
use gigflow_shared::models::events::{ActorRole, TimelineEvent};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: String,
    pub role: ActorRole,
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub actor_id: String,
    pub actor_role: ActorRole,
    #[serde(flatten)]
    pub patch: OrderPatch,
}

#[derive(Debug, Deserialize)]
pub struct CompleteMilestoneRequest {
    pub actor_id: String,
    #[serde(default)]
    pub deliverables: Vec<DeliverableSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveMilestoneRequest {
    pub actor_id: String,
    pub feedback: Option<String>,
    pub rating: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct RejectMilestoneRequest {
    pub actor_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RefundPaymentRequest {
    pub amount: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    Json(spec): Json<CreateOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.engine.create_order(spec).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.engine.get_order(order_id).await?))
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .engine
        .list_orders(
            &query.user_id,
            query.role,
            query.status,
            query.limit,
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(orders))
}

/// PATCH /v1/orders/:id
pub async fn update_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .update_order(order_id, req.patch, &req.actor_id, req.actor_role)
        .await?;
    Ok(Json(order))
}

/// GET /v1/orders/:id/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEvent>>, ApiError> {
    let order = state.engine.get_order(order_id).await?;
    Ok(Json(order.timeline))
}

/// POST /v1/orders/:id/milestones/:milestone_id/complete
pub async fn complete_milestone(
    State(state): State<AppState>,
    Path((order_id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CompleteMilestoneRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .complete_milestone(order_id, milestone_id, &req.actor_id, req.deliverables)
        .await?;
    Ok(Json(order))
}

/// POST /v1/orders/:id/milestones/:milestone_id/approve
pub async fn approve_milestone(
    State(state): State<AppState>,
    Path((order_id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ApproveMilestoneRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .approve_milestone(order_id, milestone_id, &req.actor_id, req.feedback, req.rating)
        .await?;
    Ok(Json(order))
}

/// POST /v1/orders/:id/milestones/:milestone_id/reject
pub async fn reject_milestone(
    State(state): State<AppState>,
    Path((order_id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RejectMilestoneRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .reject_milestone(order_id, milestone_id, &req.actor_id, &req.reason)
        .await?;
    Ok(Json(order))
}

/// POST /v1/orders/:id/payments/:payment_id/release
pub async fn release_payment(
    State(state): State<AppState>,
    Path((order_id, payment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Order>, ApiError> {
    let order = state.engine.release_payment(order_id, payment_id).await?;
    Ok(Json(order))
}

/// POST /v1/orders/:id/payments/:payment_id/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    Path((order_id, payment_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RefundPaymentRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .refund_payment(order_id, payment_id, req.amount)
        .await?;
    Ok(Json(order))
}
