//! HTTP surface: the WebSocket endpoint plus the static client files.

use axum::routing::get;
use axum::Router;
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::ServerConfig;
use crate::ws::{ws_handler, AppState};

/// Build the router. Static files are read from `config.public_dir` on each
/// request; missing files answer 404.
pub fn build_router(app_state: AppState, config: &ServerConfig) -> Router {
    let public = Path::new(&config.public_dir);

    Router::new()
        .route("/ws", get(ws_handler))
        .route_service("/", ServeFile::new(public.join("game.html")))
        .route_service(
            &format!("/{}", config.admin_uri),
            ServeFile::new(public.join("game-admin.html")),
        )
        .route_service("/collect.mp3", ServeFile::new(public.join("collect.mp3")))
        .route_service(
            "/100-collect.mp3",
            ServeFile::new(public.join("100-collect.mp3")),
        )
        .nest_service("/assets", ServeDir::new(public.join("assets")))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
