use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::{QUESTION_SORT, location};
use crate::{
    AppState,
    error::AppError,
    extract::{IdParam, JsonBody},
    filters::{Filters, ListParams},
    models::{
        CreateQuestionRequest, MessageResponse, QuestionEnvelope, QuestionList,
        UpdateQuestionRequest, validate_new_question, validate_question,
    },
    validator::Validator,
};

/// create_question
///
/// [Admin Route] Inserts a question and its answers as one unit.
#[utoipa::path(
    post,
    path = "/questions",
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Created", body = QuestionEnvelope),
        (status = 403, description = "Not an admin"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_question(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_new_question(&mut v, &payload);
    v.finish()?;

    let question = state.repo.insert_question(&payload).await?;
    tracing::info!(
        question_id = question.id,
        answers = question.answers.len(),
        "question created"
    );

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location("questions", question.id)?)],
        Json(QuestionEnvelope { question }),
    ))
}

/// list_questions
///
/// [Authenticated Route] Pages through questions, each with all of its answers.
#[utoipa::path(
    get,
    path = "/questions",
    params(ListParams),
    responses(
        (status = 200, description = "Questions", body = QuestionList),
        (status = 422, description = "Invalid paging or sort")
    )
)]
pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<QuestionList>, AppError> {
    let filters = Filters::from_params(&params, QUESTION_SORT)?;
    let (questions, metadata) = state.repo.list_questions(&filters).await?;
    Ok(Json(QuestionList { questions, metadata }))
}

/// update_question
///
/// [Admin Route] Changes the title and/or video reference. Answers are managed
/// through their own endpoints.
#[utoipa::path(
    patch,
    path = "/questions/{id}",
    params(("id" = i64, Path, description = "Question id")),
    request_body = UpdateQuestionRequest,
    responses(
        (status = 200, description = "Updated", body = QuestionEnvelope),
        (status = 404, description = "Unknown or malformed id"),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_question(
    State(state): State<AppState>,
    IdParam(id): IdParam,
    JsonBody(payload): JsonBody<UpdateQuestionRequest>,
) -> Result<Json<QuestionEnvelope>, AppError> {
    let mut question = state.repo.get_question(id).await?;

    if let Some(title) = payload.title {
        question.title = title;
    }
    if let Some(video_url) = payload.video_url {
        question.video_url = Some(video_url);
    }

    let mut v = Validator::new();
    validate_question(&mut v, &question);
    v.finish()?;

    let question = state.repo.update_question(&question).await?;
    Ok(Json(QuestionEnvelope { question }))
}

/// delete_question
///
/// [Admin Route] Removes a question together with the answers it owns.
#[utoipa::path(
    delete,
    path = "/questions/{id}",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown or malformed id")
    )
)]
pub async fn delete_question(
    State(state): State<AppState>,
    IdParam(id): IdParam,
) -> Result<Json<MessageResponse>, AppError> {
    state.repo.delete_question(id).await?;
    tracing::info!(question_id = id, "question deleted");
    Ok(Json(MessageResponse::new("question successfully deleted")))
}
