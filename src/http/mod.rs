//! JSON-over-HTTP surface for the scheduling engine.

mod dto;
mod error;
mod handlers;

pub use dto::{AvailabilityResponse, BookingView, SpanBody, WindowView};
pub use error::{ApiError, ApiResult};

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

use crate::calendar::InMemoryCalendar;
use crate::config::Settings;
use crate::engine::Engine;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Busy periods fed in over `PUT /staff/{id}/busy`. The engine reads the same instance.
    pub calendar: Arc<InMemoryCalendar>,
    pub settings: Settings,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/users/{id}",
            put(handlers::put_user)
                .get(handlers::get_user)
                .delete(handlers::delete_user),
        )
        .route("/availability", get(handlers::availability))
        .route(
            "/staff/{id}/availability",
            get(handlers::get_windows).put(handlers::put_windows),
        )
        .route("/staff/{id}/bookings", get(handlers::get_bookings))
        .route("/staff/{id}/requests", get(handlers::get_requests))
        .route("/staff/{id}/busy", put(handlers::put_busy))
        .route("/bookings", post(handlers::create_booking))
        .route("/bookings/urgent", post(handlers::create_urgent))
        .route("/bookings/{id}", get(handlers::get_booking))
        .route("/bookings/{id}/assign-time", post(handlers::assign_time))
        .route("/bookings/{id}/status", post(handlers::set_status))
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// RED metrics per matched route.
async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        observability::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        observability::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(start.elapsed().as_secs_f64());
    response
}
