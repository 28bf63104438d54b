pub mod attempts;
pub mod extract;
pub mod health;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::auth::{require_admin, require_bearer_auth, AuthState};
use crate::middleware::rate_limit::{rps_middleware, RateLimiter};
use crate::AppState;

/// The full application router. Rate limiting sits inside authentication so
/// each caller gets its own window.
pub fn router(state: AppState, auth: AuthState, rps: u32) -> Router {
    let limiter = RateLimiter::new(rps);

    let learner_api = Router::new()
        .route("/api/tests/:id/start", post(attempts::start_attempt))
        .route("/api/tests/attempts", get(attempts::list_attempts))
        .route("/api/tests/attempts/:id", get(attempts::get_attempt))
        .route(
            "/api/tests/attempts/:id/answers",
            post(attempts::submit_answer),
        )
        .route(
            "/api/tests/attempts/:id/complete",
            post(attempts::complete_attempt),
        )
        .layer(from_fn_with_state(limiter.clone(), rps_middleware))
        .layer(from_fn_with_state(auth.clone(), require_bearer_auth));

    let admin_api = Router::new()
        .route(
            "/api/tests/attempts/:id/review",
            put(attempts::review_attempt),
        )
        .layer(from_fn_with_state(limiter, rps_middleware))
        .layer(from_fn_with_state(auth, require_admin));

    Router::new()
        .route("/health", get(health::health))
        .merge(learner_api)
        .merge(admin_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
