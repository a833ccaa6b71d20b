use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod orders;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    Router::new()
        .route(
            "/v1/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route(
            "/v1/orders/{id}",
            get(orders::get_order).patch(orders::update_order),
        )
        .route("/v1/orders/{id}/timeline", get(orders::get_timeline))
        .route(
            "/v1/orders/{id}/milestones/{milestone_id}/complete",
            post(orders::complete_milestone),
        )
        .route(
            "/v1/orders/{id}/milestones/{milestone_id}/approve",
            post(orders::approve_milestone),
        )
        .route(
            "/v1/orders/{id}/milestones/{milestone_id}/reject",
            post(orders::reject_milestone),
        )
        .route(
            "/v1/orders/{id}/payments/{payment_id}/release",
            post(orders::release_payment),
        )
        .route(
            "/v1/orders/{id}/payments/{payment_id}/refund",
            post(orders::refund_payment),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
