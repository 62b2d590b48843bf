use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    filters::Metadata,
    scoring::MAX_ANSWER_POINTS,
    validator::{EMAIL_RX, Validator, matches},
};

// --- Enumerations (stored as SMALLINT, serialized as integers) ---

/// Role
///
/// Server-assigned access level. Never accepted from a client payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i16", into = "i16")]
#[repr(i16)]
pub enum Role {
    #[default]
    User = 0,
    Admin = 1,
}

impl TryFrom<i16> for Role {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::User),
            1 => Ok(Role::Admin),
            other => Err(format!("unknown role {other}")),
        }
    }
}

impl From<Role> for i16 {
    fn from(role: Role) -> i16 {
        role as i16
    }
}

/// ActivityStatus
///
/// Outcome of a scored submission, see [`crate::scoring::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i16", into = "i16")]
#[repr(i16)]
pub enum ActivityStatus {
    #[default]
    Ikigai = 0,
    Tool = 1,
    Trash = 2,
}

impl TryFrom<i16> for ActivityStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActivityStatus::Ikigai),
            1 => Ok(ActivityStatus::Tool),
            2 => Ok(ActivityStatus::Trash),
            other => Err(format!("unknown activity status {other}")),
        }
    }
}

impl From<ActivityStatus> for i16 {
    fn from(status: ActivityStatus) -> i16 {
        status as i16
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A registered account from the `users` table. Credential material, role and
/// row version never leave the server.
#[derive(Debug, Clone, Serialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub name: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub role: Role,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Activity
///
/// One scored quiz submission from the `activities` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Activity {
    pub id: i64,
    // FK to users.id (Owner).
    pub user_id: i64,
    pub name: String,
    pub answer_points: Vec<i16>,
    pub answers_sum: i16,
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub status: ActivityStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub version: i32,
}

/// Question
///
/// A quiz question together with the answers it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub video_url: Option<String>,
    pub version: i32,
    #[sqlx(skip)]
    pub answers: Vec<Answer>,
}

/// Answer
///
/// A weighted answer. `question_id` is `None` for answers created standalone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Answer {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub question_id: Option<i64>,
    pub title: String,
    pub points: i16,
    pub version: i32,
}

/// UserIkigai
///
/// One row of the admin report: a user and their best-scoring activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct UserIkigai {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    /// Name of the user's highest-scoring activity.
    pub ikigai: String,
    pub answers_sum: i16,
    #[ts(type = "number")]
    #[schema(value_type = i16)]
    pub status: ActivityStatus,
}

// --- Persistence Inputs ---

/// NewUser
///
/// Row data for a fresh registration. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// NewActivity
///
/// Row data for a fresh submission, with the classifier output already applied.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: i64,
    pub name: String,
    pub answer_points: Vec<i16>,
    pub answers_sum: i16,
    pub status: ActivityStatus,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for the public registration endpoint (POST /register).
/// Missing fields deserialize as empty strings and are reported by validation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// ActivationRequest
///
/// The plaintext token delivered by the welcome notification (PUT /user/activated).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct ActivationRequest {
    pub token: String,
}

/// CreateActivityRequest
///
/// Input payload for POST /activities. Sum and status are always derived server-side.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct CreateActivityRequest {
    pub name: String,
    pub answer_points: Option<Vec<i16>>,
}

/// UpdateActivityRequest
///
/// Partial update payload for PATCH/PUT /activities/{id}. `answers_sum` and `status`
/// are only honoured when recomputation on update is switched off.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateActivityRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub answer_points: Option<Vec<i16>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub answers_sum: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<i16>,
}

/// CreateAnswerRequest
///
/// A single answer, either standalone (POST /answers) or nested in a new question.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct CreateAnswerRequest {
    pub title: String,
    pub points: i16,
}

/// UpdateAnswerRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAnswerRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub points: Option<i16>,
}

/// CreateQuestionRequest
///
/// A question and its answers, inserted together (POST /questions).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct CreateQuestionRequest {
    pub title: String,
    pub video_url: Option<String>,
    pub answers: Vec<CreateAnswerRequest>,
}

/// UpdateQuestionRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateQuestionRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub video_url: Option<String>,
}

// --- Response Envelopes (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityEnvelope {
    pub activity: Activity,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityList {
    pub activities: Vec<Activity>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionEnvelope {
    pub question: Question,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionList {
    pub questions: Vec<Question>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerEnvelope {
    pub answer: Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerList {
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IkigaiList {
    pub ikigais: Vec<UserIkigai>,
    pub metadata: Metadata,
}

/// HealthResponse
///
/// Output of GET /healthcheck.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

// --- Field Validation ---

pub const MAX_NAME_BYTES: usize = 64;
pub const MAX_TITLE_BYTES: usize = 500;
pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 32;

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches(email, &EMAIL_RX), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must contain at least 8 characters",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 32 bytes long",
    );
}

pub fn validate_registration(v: &mut Validator, req: &RegisterUserRequest) {
    validate_email(v, &req.email);
    v.check(!req.name.is_empty(), "name", "must be provided");
    v.check(
        req.name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 64 bytes long",
    );
    validate_password_plaintext(v, &req.password);
}

pub fn validate_activity(v: &mut Validator, activity: &Activity) {
    v.check(!activity.name.is_empty(), "name", "must be provided");
    v.check(
        activity.name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 64 bytes long",
    );
    v.check(activity.answers_sum >= 0, "answers_sum", "must be a positive value");
}

/// Checks a raw status code before it is converted into an [`ActivityStatus`].
pub fn validate_status_code(v: &mut Validator, status: i16) {
    v.check(
        ActivityStatus::try_from(status).is_ok(),
        "status",
        "should be equal 0, 1, or 2",
    );
}

fn validate_title(v: &mut Validator, field: &str, title: &str) {
    v.check(!title.is_empty(), field, "must be provided");
    v.check(
        title.len() <= MAX_TITLE_BYTES,
        field,
        "must not be more than 500 bytes long",
    );
}

fn validate_video_url(v: &mut Validator, video_url: Option<&str>) {
    if let Some(url) = video_url {
        v.check(
            url.len() <= MAX_TITLE_BYTES,
            "video_url",
            "must not be more than 500 bytes long",
        );
    }
}

fn validate_points(v: &mut Validator, field: &str, points: i16) {
    v.check(
        (0..=MAX_ANSWER_POINTS).contains(&points),
        field,
        "must be between 0 and 3",
    );
}

pub fn validate_question(v: &mut Validator, question: &Question) {
    validate_title(v, "title", &question.title);
    validate_video_url(v, question.video_url.as_deref());
}

pub fn validate_new_question(v: &mut Validator, req: &CreateQuestionRequest) {
    validate_title(v, "title", &req.title);
    validate_video_url(v, req.video_url.as_deref());
    v.check(!req.answers.is_empty(), "answers", "must contain at least one answer");
    for (i, answer) in req.answers.iter().enumerate() {
        validate_title(v, &format!("answers[{i}].title"), &answer.title);
        validate_points(v, &format!("answers[{i}].points"), answer.points);
    }
}

pub fn validate_answer(v: &mut Validator, title: &str, points: i16) {
    validate_title(v, "title", title);
    validate_points(v, "points", points);
}
