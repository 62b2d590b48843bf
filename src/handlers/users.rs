use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Duration;

use super::IKIGAI_SORT;
use crate::{
    AppState,
    auth::{cleared_session_cookie, issue_session, session_cookie},
    error::AppError,
    extract::JsonBody,
    filters::{Filters, ListParams},
    models::{
        ActivationRequest, IkigaiList, LoginRequest, MessageResponse, NewUser,
        RegisterUserRequest, UserEnvelope, validate_email, validate_password_plaintext,
        validate_registration,
    },
    notifier::{WelcomeMessage, send_in_background},
    password::{hash_password_blocking, verify_password_blocking},
    repository::RepositoryError,
    tokens::{ACTIVATION_TTL_DAYS, SCOPE_ACTIVATION, generate_token, validate_token_plaintext},
    validator::{ValidationErrors, Validator},
};

/// register_user
///
/// [Public Route] Creates an account, stores an activation token and signs the
/// caller in. The welcome notification carrying the token is sent in the background
/// and never delays or fails this response.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered; session cookie set", body = MessageResponse),
        (status = 400, description = "Malformed body"),
        (status = 422, description = "Validation failed or email taken")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_registration(&mut v, &payload);
    v.finish()?;

    let password_hash = hash_password_blocking(payload.password).await?;
    let user = state
        .repo
        .insert_user(NewUser {
            email: payload.email,
            name: payload.name,
            password_hash,
        })
        .await?;

    let token = generate_token(user.id, Duration::days(ACTIVATION_TTL_DAYS), SCOPE_ACTIVATION);
    state.repo.insert_token(&token).await?;

    send_in_background(
        state.notifier.clone(),
        WelcomeMessage {
            recipient: user.email.clone(),
            name: user.name.clone(),
            user_id: user.id,
            activation_token: token.plaintext,
        },
    );

    let session = issue_session(&user, &state.config.session)?;
    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&session)?)],
        Json(MessageResponse::new("successfully registered")),
    ))
}

/// login_user
///
/// [Public Route] Exchanges credentials for a session cookie. An unknown email and a
/// wrong password produce the same response.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authorized; session cookie set", body = MessageResponse),
        (status = 400, description = "Invalid credentials or malformed body"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.finish()?;

    let user = match state.repo.get_user_by_email(&payload.email).await {
        Ok(user) => user,
        Err(RepositoryError::RecordNotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = user.id, "login rejected: password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let session = issue_session(&user, &state.config.session)?;

    Ok((
        [(header::SET_COOKIE, session_cookie(&session)?)],
        Json(MessageResponse::new("successfully authorized")),
    ))
}

/// logout_user
///
/// [Public Route] Expires the session cookie on the client.
#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 200, description = "Cookie cleared", body = MessageResponse))
)]
pub async fn logout_user() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cleared_session_cookie())],
        Json(MessageResponse::new("logged out")),
    )
}

/// activate_user
///
/// [Public Route] Consumes an activation token. On success every activation token
/// the user holds is deleted, so each can be used at most once.
#[utoipa::path(
    put,
    path = "/user/activated",
    request_body = ActivationRequest,
    responses(
        (status = 200, description = "Activated user", body = UserEnvelope),
        (status = 409, description = "Concurrent modification"),
        (status = 422, description = "Malformed, unknown or expired token")
    )
)]
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ActivationRequest>,
) -> Result<Json<UserEnvelope>, AppError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    v.finish()?;

    let mut user = match state.repo.get_user_for_token(SCOPE_ACTIVATION, &payload.token).await {
        Ok(user) => user,
        Err(RepositoryError::RecordNotFound) => {
            return Err(ValidationErrors::single("token", "invalid or expired activation token").into());
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    let user = state.repo.update_user(&user).await?;
    state
        .repo
        .delete_tokens_for_user(SCOPE_ACTIVATION, user.id)
        .await?;

    tracing::info!(user_id = user.id, "user activated");
    Ok(Json(UserEnvelope { user }))
}

/// list_ikigais
///
/// [Admin Route] Each user's best-scoring activity, optionally narrowed by an email
/// substring (`search`).
#[utoipa::path(
    get,
    path = "/ikigais",
    params(ListParams),
    responses(
        (status = 200, description = "Report page", body = IkigaiList),
        (status = 403, description = "Not an admin"),
        (status = 422, description = "Invalid paging or sort")
    )
)]
pub async fn list_ikigais(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<IkigaiList>, AppError> {
    let filters = Filters::from_params(&params, IKIGAI_SORT)?;
    let search = params.search.as_deref().unwrap_or("").trim();

    let (ikigais, metadata) = state.repo.list_user_ikigais(search, &filters).await?;
    Ok(Json(IkigaiList { ikigais, metadata }))
}
