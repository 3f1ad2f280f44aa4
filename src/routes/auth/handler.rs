use axum::extract::{Json, State, rejection::JsonRejection};

use crate::{
    AppState,
    error::AppError,
    services::LoginToken,
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{LoginRequest, RegisterRequest, RegisterResponse};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<RegisterResponse>>, AppError> {
    let Json(req) = payload?;
    let user = state
        .auth
        .register(&req.username, &req.email, &req.password)
        .await?;

    Ok(success_to_api_response(RegisterResponse {
        user_id: user.public_id,
        username: user.display_name,
    }))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<LoginToken>>, AppError> {
    let Json(req) = payload?;
    let token = state.auth.login(&req.username, &req.password).await?;
    Ok(success_to_api_response(token))
}
