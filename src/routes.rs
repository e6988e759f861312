use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/users", post(handlers::create_user))
        .route(
            "/api/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/templates/{id}",
            get(handlers::get_template).put(handlers::update_template),
        )
        .route("/api/memes", get(handlers::list_memes).post(handlers::create_meme))
        // static segments take precedence over the {id} capture
        .route("/api/memes/random", get(handlers::random_meme))
        .route("/api/memes/top", get(handlers::top_memes))
        .route("/api/memes/{id}", get(handlers::get_meme).delete(handlers::delete_meme))
        .route("/api/memes/{id}/rate", post(handlers::rate_meme))
        .route("/api/ratings", get(handlers::list_ratings))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
