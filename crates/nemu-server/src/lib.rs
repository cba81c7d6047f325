//! nemu-server - REST API server for nemu.
//!
//! Exposes the knowledge engine's entry points to a chat transport over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nemu_core::{KnowledgeEngine, NemuConfig};
//! use nemu_server::{create_server, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = KnowledgeEngine::open(&NemuConfig::from_env()).unwrap();
//!     let app = create_server(AppState::new(Arc::new(engine)));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
