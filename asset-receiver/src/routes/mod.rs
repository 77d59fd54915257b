pub mod files;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/{name}",
            get(files::get_file)
                .head(files::head_file)
                .put(files::put_file),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
