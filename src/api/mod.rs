//! HTTP boundary: routing, JSON mapping and role resolution. All business
//! decisions live in [`ReservationService`].

mod dto;
mod error;
mod handlers;

use std::path::Path;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::REFRESH_COOKIE;

use crate::auth::TokenIssuer;
use crate::observability;
use crate::reservation::ReservationService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReservationService>,
    pub tokens: Arc<TokenIssuer>,
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/calendar/entries", get(handlers::list_entries).post(handlers::create_entry))
        .route("/calendar/entries/{id}", delete(handlers::delete_entry))
        .route("/calendar/series", post(handlers::create_series))
        .route("/calendar/series/{id}", delete(handlers::delete_series))
        .route("/admin/login", post(handlers::login))
        .route("/admin/token", get(handlers::refresh_token))
        .route("/admin/user", delete(handlers::scrub_user))
        .route("/health", get(handlers::health))
        .route_layer(middleware::from_fn(observability::track_requests))
}

/// Full application: `/api` plus the single-page frontend for every other
/// path, falling back to `index.html` so client-side routes resolve.
pub fn router(state: AppState, frontend_dir: &Path) -> Router {
    let spa = ServeDir::new(frontend_dir).fallback(ServeFile::new(frontend_dir.join("index.html")));

    Router::new()
        .nest("/api", api_routes())
        .fallback_service(spa)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
