use axum::extract::{
    Extension, Json, Query, State,
    rejection::{JsonRejection, QueryRejection},
};

use crate::{
    AppState,
    error::AppError,
    models::FriendGraph,
    routes::{clamp_radius, required},
    services::PresenceResult,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{
    AcceptFriendRequest, CancelFriendRequest, DeclineFriendRequest, FriendActionResponse,
    LocationQuery, PingResponse, RemoveFriendRequest, SendFriendRequest,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[axum::debug_handler]
pub async fn ping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> ApiResult<PingResponse> {
    let Query(query) = query?;
    let latitude = required(query.lat, "lat")?;
    let longitude = required(query.lon, "lon")?;

    state
        .presence
        .update_location(&claims.sub, longitude, latitude)
        .await?;

    Ok(success_to_api_response(PingResponse {
        user_id: claims.sub,
        longitude,
        latitude,
    }))
}

#[axum::debug_handler]
pub async fn nearby_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> ApiResult<PresenceResult> {
    let Query(query) = query?;
    let latitude = required(query.lat, "lat")?;
    let longitude = required(query.lon, "lon")?;
    let radius = clamp_radius(query.radius, state.config.max_search_radius);

    let result = state
        .social
        .nearby_users(&claims.sub, longitude, latitude, radius)
        .await?;
    Ok(success_to_api_response(result))
}

#[axum::debug_handler]
pub async fn nearby_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> ApiResult<PresenceResult> {
    let Query(query) = query?;
    let latitude = required(query.lat, "lat")?;
    let longitude = required(query.lon, "lon")?;
    let radius = clamp_radius(query.radius, state.config.max_search_radius);

    let result = state
        .social
        .nearby_friends(&claims.sub, longitude, latitude, radius)
        .await?;
    Ok(success_to_api_response(result))
}

#[axum::debug_handler]
pub async fn friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<FriendGraph> {
    let graph = state.social.friends_of(&claims.sub).await?;
    Ok(success_to_api_response(graph))
}

#[axum::debug_handler]
pub async fn send_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendFriendRequest>, JsonRejection>,
) -> ApiResult<FriendActionResponse> {
    let Json(req) = payload?;
    state
        .social
        .send_request(&claims.sub, &req.recipient_id)
        .await?;
    Ok(success_to_api_response(FriendActionResponse {
        user_id: claims.sub,
        peer_id: req.recipient_id,
    }))
}

#[axum::debug_handler]
pub async fn accept_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<AcceptFriendRequest>, JsonRejection>,
) -> ApiResult<FriendActionResponse> {
    let Json(req) = payload?;
    state
        .social
        .accept_request(&claims.sub, &req.sender_id)
        .await?;
    Ok(success_to_api_response(FriendActionResponse {
        user_id: claims.sub,
        peer_id: req.sender_id,
    }))
}

#[axum::debug_handler]
pub async fn decline_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<DeclineFriendRequest>, JsonRejection>,
) -> ApiResult<FriendActionResponse> {
    let Json(req) = payload?;
    state
        .social
        .decline_request(&claims.sub, &req.sender_id)
        .await?;
    Ok(success_to_api_response(FriendActionResponse {
        user_id: claims.sub,
        peer_id: req.sender_id,
    }))
}

#[axum::debug_handler]
pub async fn cancel_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CancelFriendRequest>, JsonRejection>,
) -> ApiResult<FriendActionResponse> {
    let Json(req) = payload?;
    state
        .social
        .cancel_request(&claims.sub, &req.recipient_id)
        .await?;
    Ok(success_to_api_response(FriendActionResponse {
        user_id: claims.sub,
        peer_id: req.recipient_id,
    }))
}

#[axum::debug_handler]
pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<RemoveFriendRequest>, JsonRejection>,
) -> ApiResult<FriendActionResponse> {
    let Json(req) = payload?;
    state
        .social
        .remove_friend(&claims.sub, &req.friend_id)
        .await?;
    Ok(success_to_api_response(FriendActionResponse {
        user_id: claims.sub,
        peer_id: req.friend_id,
    }))
}
