use axum::{extract::State, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{auth::AdminCredential, ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub ok: bool,
}

/// Checks an admin key so the dashboard can gate its UI. Stateless; every
/// admin request still carries the key.
#[utoipa::path(
    post,
    path = "/api/v1/admin/login",
    summary = "Verify admin key",
    responses(
        (status = 200, description = "Key accepted", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Missing or invalid key", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "admin"
)]
pub async fn login(
    State(state): State<AppState>,
    credential: Option<AdminCredential>,
) -> ApiResult<LoginResponse> {
    state.verifier.authorize(credential.as_ref())?;
    Ok(Json(ApiResponse::success(LoginResponse { ok: true })))
}
