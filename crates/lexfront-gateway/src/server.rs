//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use lexfront_core::error::Result;
use lexfront_lifecycle::Lifecycle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// The lifecycle engine — all transitions go through it.
    pub service: Arc<Lifecycle>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health_check))
        // Posts
        .route("/api/posts", post(routes::create_post).get(routes::list_posts))
        .route("/api/posts/{id}", get(routes::get_post))
        .route("/api/posts/{id}/schedule", post(routes::schedule_post))
        .route(
            "/api/posts/{id}/cancel-schedule",
            post(routes::cancel_post_schedule),
        )
        .route("/api/posts/{id}/publish", post(routes::publish_post))
        .route("/api/posts/{id}/unpublish", post(routes::unpublish_post))
        // Campaigns
        .route(
            "/api/campaigns",
            post(routes::create_campaign).get(routes::list_campaigns),
        )
        .route("/api/campaigns/{id}", get(routes::get_campaign))
        .route(
            "/api/campaigns/{id}/schedule",
            post(routes::schedule_campaign),
        )
        .route(
            "/api/campaigns/{id}/cancel-schedule",
            post(routes::cancel_campaign_schedule),
        )
        .route("/api/campaigns/{id}/send", post(routes::send_campaign))
        .route(
            "/api/campaigns/{id}/track/open",
            post(routes::track_open),
        )
        .route(
            "/api/campaigns/{id}/track/click",
            post(routes::track_click),
        )
        // Scheduling views
        .route("/api/scheduled/posts", get(routes::scheduled_posts))
        .route("/api/scheduled/campaigns", get(routes::scheduled_campaigns))
        // Newsletter subscriptions
        .route("/api/subscribers", post(routes::subscribe))
        .route("/api/subscribers/unsubscribe", post(routes::unsubscribe))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the gateway.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
