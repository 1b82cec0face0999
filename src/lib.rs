//! Shopfront API library
//!
//! Catalog, carts, transactional checkout, order lifecycle and payment gateway integration
//! behind an axum REST surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod payments;
pub mod services;
pub mod tracing;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    auth::AuthService, errors::ServiceError, events::EventSender, handlers::AppServices,
    payments::PaymentGateway,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub auth: Arc<AuthService>,
    pub services: AppServices,
}

impl AppState {
    /// Wires every service from configuration. `gateway` is injected so callers decide how the
    /// payment gateway is built (from config in production, a stub in tests).
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: EventSender,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let auth = Arc::new(AuthService::new(
            db.clone(),
            &config.jwt_secret,
            config.jwt_expiration,
        ));
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.pricing_policy(),
            gateway,
            &config.payment_currency,
        );

        Self {
            db,
            config: Arc::new(config),
            event_sender,
            auth,
            services,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn captured_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            request_id: captured_request_id(),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            request_id: captured_request_id(),
        }
    }
}

/// Liveness probe; no database round trip.
async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "E-commerce API is running successfully!",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe: pings the database.
async fn readiness(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ServiceError> {
    db::check_connection(&state.db).await?;
    Ok(Json(json!({ "success": true, "database": "ok" })))
}

async fn not_found() -> ServiceError {
    ServiceError::NotFound("Route not found".into())
}

/// All `/api` routes, without state or global layers.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/products", handlers::products::product_routes())
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/payment", handlers::payments::payment_routes())
}

/// Makes the [`AuthService`] available to `auth_middleware` through request extensions.
async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// Complete application router: API routes, 404 fallback, auth injection, HTTP tracing and
/// request ids. Transport concerns (CORS, compression) are added by the binary.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            inject_auth_service,
        ))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
