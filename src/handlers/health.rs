use axum::{Json, extract::State};

use crate::{
    config::AppConfig,
    models::{HealthResponse, SystemInfo},
};

/// healthcheck
///
/// [Public Route] Liveness probe reporting the running environment and crate version.
#[utoipa::path(
    get,
    path = "/healthcheck",
    responses((status = 200, description = "Service is available", body = HealthResponse))
)]
pub async fn healthcheck(State(config): State<AppConfig>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: config.env.as_str().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}
