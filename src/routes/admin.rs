use crate::{
    AppState,
    handlers::{activities, answers, questions, users},
};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Admin Router Module
///
/// Endpoints restricted to the admin role: question bank maintenance and the
/// cross-user reports. Paths that also serve authenticated reads (`/questions`,
/// `/answers`) only register their write methods here; the two routers are merged
/// method by method.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /questions
        // Creates a question with all of its answers in one transaction.
        .route("/questions", post(questions::create_question))
        // PATCH/DELETE /questions/{id}
        // Deleting a question also removes the answers it owns.
        .route(
            "/questions/{id}",
            patch(questions::update_question).delete(questions::delete_question),
        )
        // POST /answers
        // Standalone answers, not attached to any question.
        .route("/answers", post(answers::create_answer))
        // PUT/DELETE /answers/{id}
        .route(
            "/answers/{id}",
            put(answers::update_answer).delete(answers::delete_answer),
        )
        // GET /admin/activities?user_id=...
        // Every user's activities, or one user's when `user_id` is given.
        .route("/admin/activities", get(activities::list_user_activities))
        // GET /ikigais?search=...
        // Each user's best activity.
        .route("/ikigais", get(users::list_ikigais))
}
