use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::{ACTIVITY_SORT, location};
use crate::{
    AppState,
    auth::{AuthUser, authorize_owner},
    error::AppError,
    extract::{IdParam, JsonBody},
    filters::{Filters, ListParams},
    models::{
        Activity, ActivityEnvelope, ActivityList, ActivityStatus, CreateActivityRequest,
        NewActivity, UpdateActivityRequest, validate_activity, validate_status_code,
    },
    scoring::{Evaluation, classify},
    validator::Validator,
};

/// create_activity
///
/// [Authenticated Route] Stores a quiz submission owned by the caller. The sum and
/// status are always derived from `answer_points`.
#[utoipa::path(
    post,
    path = "/activities",
    request_body = CreateActivityRequest,
    responses(
        (status = 201, description = "Created and classified", body = ActivityEnvelope),
        (status = 403, description = "No valid session"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_activity(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateActivityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let answer_points = payload.answer_points.unwrap_or_default();
    let Evaluation { sum, status } = classify(&answer_points);

    let draft = Activity {
        user_id: user.id,
        name: payload.name,
        answer_points,
        answers_sum: sum,
        status,
        ..Activity::default()
    };

    let mut v = Validator::new();
    validate_activity(&mut v, &draft);
    v.finish()?;

    let activity = state
        .repo
        .insert_activity(NewActivity {
            user_id: draft.user_id,
            name: draft.name,
            answer_points: draft.answer_points,
            answers_sum: draft.answers_sum,
            status: draft.status,
        })
        .await?;

    tracing::info!(
        activity_id = activity.id,
        user_id = user.id,
        status = ?activity.status,
        "activity created"
    );

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location("activities", activity.id)?)],
        Json(ActivityEnvelope { activity }),
    ))
}

/// update_activity
///
/// [Authenticated Route] Partially updates an activity (served for both PATCH and PUT).
///
/// *Authorization*: the record is loaded first; only its owner or an admin may continue.
/// *Derived fields*: with recomputation enabled, `answers_sum` and `status` follow the
/// resulting `answer_points`; otherwise client-supplied values are accepted after validation.
#[utoipa::path(
    patch,
    path = "/activities/{id}",
    params(("id" = i64, Path, description = "Activity id")),
    request_body = UpdateActivityRequest,
    responses(
        (status = 200, description = "Updated", body = ActivityEnvelope),
        (status = 403, description = "Not the owner and not an admin"),
        (status = 404, description = "Unknown or malformed id"),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_activity(
    user: AuthUser,
    State(state): State<AppState>,
    IdParam(id): IdParam,
    JsonBody(payload): JsonBody<UpdateActivityRequest>,
) -> Result<Json<ActivityEnvelope>, AppError> {
    let mut activity = state.repo.get_activity(id).await?;
    authorize_owner(&user, activity.user_id)?;

    if let Some(name) = payload.name {
        activity.name = name;
    }
    if let Some(points) = payload.answer_points {
        activity.answer_points = points;
    }

    let mut v = Validator::new();
    if state.config.recompute_status_on_update {
        let Evaluation { sum, status } = classify(&activity.answer_points);
        activity.answers_sum = sum;
        activity.status = status;
    } else {
        if let Some(sum) = payload.answers_sum {
            activity.answers_sum = sum;
        }
        if let Some(code) = payload.status {
            validate_status_code(&mut v, code);
            if let Ok(status) = ActivityStatus::try_from(code) {
                activity.status = status;
            }
        }
    }

    validate_activity(&mut v, &activity);
    v.finish()?;

    let activity = state.repo.update_activity(&activity).await?;
    Ok(Json(ActivityEnvelope { activity }))
}

/// list_my_activities
///
/// [Authenticated Route] Pages through the caller's own activities.
#[utoipa::path(
    get,
    path = "/activities",
    params(ListParams),
    responses(
        (status = 200, description = "Own activities", body = ActivityList),
        (status = 422, description = "Invalid paging or sort")
    )
)]
pub async fn list_my_activities(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ActivityList>, AppError> {
    let filters = Filters::from_params(&params, ACTIVITY_SORT)?;
    let (activities, metadata) = state.repo.list_activities(Some(user.id), &filters).await?;
    Ok(Json(ActivityList { activities, metadata }))
}

/// list_user_activities
///
/// [Admin Route] Pages through activities of one user (`user_id`) or of everyone.
#[utoipa::path(
    get,
    path = "/admin/activities",
    params(ListParams),
    responses(
        (status = 200, description = "Activities", body = ActivityList),
        (status = 403, description = "Not an admin"),
        (status = 422, description = "Invalid paging, sort or user_id")
    )
)]
pub async fn list_user_activities(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ActivityList>, AppError> {
    let mut v = Validator::new();
    let user_id = match params.user_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) if id >= 1 => Some(id),
            Ok(_) => {
                v.add_error("user_id", "must be greater than zero");
                None
            }
            Err(_) => {
                v.add_error("user_id", "must be an integer value");
                None
            }
        },
    };
    let filters = Filters::read(&params, ACTIVITY_SORT, &mut v);
    v.finish()?;

    let (activities, metadata) = state.repo.list_activities(user_id, &filters).await?;
    Ok(Json(ActivityList { activities, metadata }))
}
