use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, post},
    Router,
};
use kairos_core::AppContext;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use crate::auth;
use crate::handlers;
use crate::registry::ConnectionRegistry;
use crate::sse;

pub async fn run(ctx: AppContext, registry: Arc<ConnectionRegistry>) -> Result<()> {
    let port = ctx.config.server.port;

    // Configure CORS - allow specific origins or all if CORS_ORIGINS not set
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let origin_list: Vec<&str> = origins.split(',').map(|s| s.trim()).collect();
        let mut cors = CorsLayer::new();
        for origin in origin_list {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/auth/token", post(handlers::generate_token))
        .route("/api/v1/events", get(sse::events_handler))
        .route("/api/v1/assignments", post(handlers::request_assignment))
        .route("/api/v1/assignments/me", get(handlers::my_trainer))
        .route("/api/v1/assignments/roster", get(handlers::trainer_roster))
        .route("/api/v1/assignments/:client_id", delete(handlers::remove_assignment))
        .route("/api/v1/notifications", get(handlers::get_notifications))
        .route("/api/v1/notifications", post(handlers::create_notification))
        .route("/api/v1/notifications/counts", get(handlers::get_notification_counts))
        .route("/api/v1/notifications/:id/read", post(handlers::mark_notification_read))
        .route("/api/v1/notifications/read-all", post(handlers::mark_all_notifications_read))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(ctx))
                .layer(Extension(registry))
                .layer(middleware::from_fn(auth::auth_middleware))
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
