use crate::{AppState, handlers::{health, users}};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Public Router Module
///
/// Endpoints reachable without a session. These are the entry points of the
/// identity flow plus the liveness probe.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /healthcheck
        // Liveness probe for load balancers; reports environment and version.
        .route("/healthcheck", get(health::healthcheck))
        // POST /register
        // Creates the account, queues the welcome notification and sets the session cookie.
        .route("/register", post(users::register_user))
        // POST /login
        .route("/login", post(users::login_user))
        // GET /logout
        // Expires the session cookie; works with or without a current session.
        .route("/logout", get(users::logout_user))
        // PUT /user/activated
        // Consumes the one-time activation token from the welcome notification.
        .route("/user/activated", put(users::activate_user))
}
