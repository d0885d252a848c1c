pub mod auth;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the full service router: CORS, request tracing, and the route
/// table, grounded on the `porua` reference server's
/// `create_router()`/`CorsLayer::new().allow_origin(Any)` pattern.
pub fn build_app(state: AppState) -> axum::Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
