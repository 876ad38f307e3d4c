use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no token: every read, the login exchange and comment
/// submission (comments are gated by the moderation policy instead).
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/login
        // Exchanges admin credentials for a 24h bearer token.
        .route("/api/auth/login", post(handlers::login))
        // --- Content listings & details ---
        .route("/api/posts", get(handlers::get_posts))
        .route("/api/posts/{id}", get(handlers::get_post))
        .route("/api/atualizacoes", get(handlers::get_updates))
        .route("/api/atualizacoes/{id}", get(handlers::get_update))
        .route("/api/downloads", get(handlers::get_downloads))
        .route("/api/downloads/{id}", get(handlers::get_download))
        // --- Comments ---
        // POST /api/comentarios
        // Anyone may comment; the moderation policy decides visibility.
        .route("/api/comentarios", post(handlers::create_comment))
        // GET /api/comentarios/{item_type}/{item_id}
        // Approved comments for one post, update or download.
        .route(
            "/api/comentarios/{item_type}/{item_id}",
            get(handlers::get_comments),
        )
}
