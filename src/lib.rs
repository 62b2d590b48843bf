use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::{any::Any, sync::Arc};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod filters;
pub mod handlers;
pub mod limiter;
pub mod models;
pub mod notifier;
pub mod password;
pub mod repository;
pub mod scoring;
pub mod tokens;
pub mod validator;

// Routing segregated by guard (Public, Authenticated, Admin).
pub mod routes;
use auth::{AdminUser, AuthUser};
use error::AppError;
use limiter::{RateLimiter, rate_limit};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use notifier::{LogNotifier, MockNotifier, NotifierState, WebhookNotifier};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and payload schema into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::healthcheck,
        handlers::users::register_user, handlers::users::login_user,
        handlers::users::logout_user, handlers::users::activate_user,
        handlers::users::list_ikigais,
        handlers::activities::create_activity, handlers::activities::update_activity,
        handlers::activities::list_my_activities, handlers::activities::list_user_activities,
        handlers::questions::create_question, handlers::questions::list_questions,
        handlers::questions::update_question, handlers::questions::delete_question,
        handlers::answers::create_answer, handlers::answers::list_answers,
        handlers::answers::update_answer, handlers::answers::delete_answer,
    ),
    components(
        schemas(
            models::User, models::Activity, models::Question, models::Answer,
            models::UserIkigai, models::RegisterUserRequest, models::LoginRequest,
            models::ActivationRequest, models::CreateActivityRequest,
            models::UpdateActivityRequest, models::CreateQuestionRequest,
            models::UpdateQuestionRequest, models::CreateAnswerRequest,
            models::UpdateAnswerRequest, models::MessageResponse, models::UserEnvelope,
            models::ActivityEnvelope, models::ActivityList, models::QuestionEnvelope,
            models::QuestionList, models::AnswerEnvelope, models::AnswerList,
            models::IkigaiList, models::HealthResponse, models::SystemInfo,
            filters::Metadata,
        )
    ),
    tags(
        (name = "ikigai", description = "Ikigai self-assessment API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of shared services handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Delivery channel for welcome notifications.
    pub notifier: NotifierState,
    /// The configuration loaded once at startup.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for NotifierState {
    fn from_ref(app_state: &AppState) -> NotifierState {
        app_state.notifier.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// require_session
///
/// Guard for the authenticated routes. The `AuthUser` extractor rejects the request
/// with 403 when the cookie is missing or the token does not verify; on success the
/// identity is stored in the request extensions for the handler.
async fn require_session(user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// require_admin
///
/// Guard for the admin routes: a valid session whose role claim is admin.
async fn require_admin(AdminUser(user): AdminUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

async fn not_found() -> AppError {
    AppError::NotFound
}

/// create_router
///
/// Assembles the routing tree, applies each group's guard and the global layers,
/// and binds the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(AnyOrigin)
        .allow_origin(AnyOrigin)
        .allow_headers(AnyOrigin);

    // Header name for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let limiter = state
        .config
        .limiter
        .enabled
        .then(|| Arc::new(RateLimiter::new(&state.config.limiter)));
    let request_timeout = state.config.request_timeout;

    // 2. Base Router Assembly
    let mut router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), require_session)),
        )
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), require_admin)),
        )
        .fallback(not_found)
        .with_state(state);

    // 3. Admission control runs before routing and authentication.
    if let Some(limiter) = limiter {
        router = router.layer(middleware::from_fn_with_state(limiter, rate_limit));
    }

    // 4. Observability, panic recovery and request deadline (outermost first).
    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        // 5. CORS Layer
        .layer(cors)
}

/// panic_response
///
/// Converts a handler panic into the standard 500 envelope and closes the connection.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    let mut response = AppError::Internal(format!("handler panicked: {detail}")).into_response();
    response.headers_mut().insert(
        axum::http::header::CONNECTION,
        axum::http::HeaderValue::from_static("close"),
    );
    response
}

/// trace_span_logger
///
/// Builds the per-request span, tagging it with the `x-request-id` set by the
/// request-id layer so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
