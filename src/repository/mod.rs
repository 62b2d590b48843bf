use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    filters::{Filters, Metadata},
    models::{
        Activity, Answer, CreateAnswerRequest, CreateQuestionRequest, NewActivity, NewUser,
        Question, User, UserIkigai,
    },
    tokens::Token,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Outcomes the handlers translate into specific responses. Anything the database
/// reports that is not one of the named cases stays wrapped in `Database`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    RecordNotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// A page of records together with its pagination metadata.
pub type Page<T> = (Vec<T>, Metadata);

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, so handlers never
/// depend on a concrete store (Postgres in production, in-memory in tests).
///
/// Conventions shared by every implementation:
/// - ids below 1 are never looked up and yield `RecordNotFound`;
/// - updates are conditional on the row `version`; a miss yields `EditConflict`;
/// - deletes that remove nothing yield `RecordNotFound`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn insert_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn update_user(&self, user: &User) -> RepoResult<User>;
    /// Resolves the owner of an unexpired token with the given scope.
    async fn get_user_for_token(&self, scope: &str, plaintext: &str) -> RepoResult<User>;
    /// Admin report: each user's best activity, optionally filtered by email substring.
    async fn list_user_ikigais(&self, search_email: &str, filters: &Filters) -> RepoResult<Page<UserIkigai>>;

    // --- Tokens ---
    async fn insert_token(&self, token: &Token) -> RepoResult<()>;
    async fn delete_tokens_for_user(&self, scope: &str, user_id: i64) -> RepoResult<()>;

    // --- Activities ---
    async fn insert_activity(&self, activity: NewActivity) -> RepoResult<Activity>;
    async fn get_activity(&self, id: i64) -> RepoResult<Activity>;
    async fn update_activity(&self, activity: &Activity) -> RepoResult<Activity>;
    /// Lists one user's activities, or everyone's when `user_id` is `None`.
    async fn list_activities(&self, user_id: Option<i64>, filters: &Filters) -> RepoResult<Page<Activity>>;

    // --- Questions ---
    /// Inserts the question and all of its answers atomically.
    async fn insert_question(&self, question: &CreateQuestionRequest) -> RepoResult<Question>;
    async fn get_question(&self, id: i64) -> RepoResult<Question>;
    async fn update_question(&self, question: &Question) -> RepoResult<Question>;
    async fn delete_question(&self, id: i64) -> RepoResult<()>;
    /// Paginates questions (not answer rows); each carries its answers ordered by id.
    async fn list_questions(&self, filters: &Filters) -> RepoResult<Page<Question>>;

    // --- Answers ---
    async fn insert_answer(&self, answer: &CreateAnswerRequest) -> RepoResult<Answer>;
    async fn get_answer(&self, id: i64) -> RepoResult<Answer>;
    async fn update_answer(&self, answer: &Answer) -> RepoResult<Answer>;
    async fn delete_answer(&self, id: i64) -> RepoResult<()>;
    async fn list_answers(&self) -> RepoResult<Vec<Answer>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
