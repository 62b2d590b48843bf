use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::location;
use crate::{
    AppState,
    error::AppError,
    extract::{IdParam, JsonBody},
    models::{
        AnswerEnvelope, AnswerList, CreateAnswerRequest, MessageResponse, UpdateAnswerRequest,
        validate_answer,
    },
    validator::Validator,
};

/// create_answer
///
/// [Admin Route] Creates an answer that belongs to no question.
#[utoipa::path(
    post,
    path = "/answers",
    request_body = CreateAnswerRequest,
    responses(
        (status = 201, description = "Created", body = AnswerEnvelope),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_answer(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_answer(&mut v, &payload.title, payload.points);
    v.finish()?;

    let answer = state.repo.insert_answer(&payload).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location("answers", answer.id)?)],
        Json(AnswerEnvelope { answer }),
    ))
}

/// list_answers
///
/// [Authenticated Route] Every answer, ordered by id.
#[utoipa::path(
    get,
    path = "/answers",
    responses((status = 200, description = "Answers", body = AnswerList))
)]
pub async fn list_answers(State(state): State<AppState>) -> Result<Json<AnswerList>, AppError> {
    let answers = state.repo.list_answers().await?;
    Ok(Json(AnswerList { answers }))
}

/// update_answer
///
/// [Admin Route] Replaces the title and/or points; omitted fields keep their value.
#[utoipa::path(
    put,
    path = "/answers/{id}",
    params(("id" = i64, Path, description = "Answer id")),
    request_body = UpdateAnswerRequest,
    responses(
        (status = 200, description = "Updated", body = AnswerEnvelope),
        (status = 404, description = "Unknown or malformed id"),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_answer(
    State(state): State<AppState>,
    IdParam(id): IdParam,
    JsonBody(payload): JsonBody<UpdateAnswerRequest>,
) -> Result<Json<AnswerEnvelope>, AppError> {
    let mut answer = state.repo.get_answer(id).await?;

    if let Some(title) = payload.title {
        answer.title = title;
    }
    if let Some(points) = payload.points {
        answer.points = points;
    }

    let mut v = Validator::new();
    validate_answer(&mut v, &answer.title, answer.points);
    v.finish()?;

    let answer = state.repo.update_answer(&answer).await?;
    Ok(Json(AnswerEnvelope { answer }))
}

/// delete_answer
#[utoipa::path(
    delete,
    path = "/answers/{id}",
    params(("id" = i64, Path, description = "Answer id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown or malformed id")
    )
)]
pub async fn delete_answer(
    State(state): State<AppState>,
    IdParam(id): IdParam,
) -> Result<Json<MessageResponse>, AppError> {
    state.repo.delete_answer(id).await?;
    Ok(Json(MessageResponse::new("answer successfully deleted")))
}
