use crate::{
    AppState,
    handlers::{activities, answers, questions},
};
use axum::{
    Router,
    routing::{get, patch},
};

/// Authenticated Router Module
///
/// Endpoints for any signed-in user. The session guard is applied by `create_router`;
/// handlers that need the caller's identity take an `AuthUser` argument, which is
/// read back from the request extensions populated by the guard.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /questions
        // The question bank, paginated by question.
        .route("/questions", get(questions::list_questions))
        // GET /answers
        .route("/answers", get(answers::list_answers))
        // GET/POST /activities
        // Lists the caller's own submissions, or stores and classifies a new one.
        .route(
            "/activities",
            get(activities::list_my_activities).post(activities::create_activity),
        )
        // PATCH/PUT /activities/{id}
        // Both methods share one partial-update handler. The ownership-or-admin check
        // happens inside the handler after the record is loaded.
        .route(
            "/activities/{id}",
            patch(activities::update_activity).put(activities::update_activity),
        )
}
