// Route definitions for the runbox gateway

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::index))
        .route("/execute", post(handlers::execute))
}
