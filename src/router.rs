use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors, panic_response},
    routes,
};

// 注册与登录，无需认证
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
}

// 兴趣点查询，无需认证
pub fn poi_routes() -> Router<AppState> {
    Router::new().route("/pois", get(routes::poi::nearby_pois))
}

// 位置上报、附近的人与好友关系，需要认证
pub fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/user/ping", post(routes::user::ping))
        .route("/user/nearby", get(routes::user::nearby_users))
        .route("/user/nearby-friends", get(routes::user::nearby_friends))
        .route("/user/friends", get(routes::user::friends))
        .route(
            "/user/send-friend-request",
            post(routes::user::send_friend_request),
        )
        .route(
            "/user/accept-friend-request",
            post(routes::user::accept_friend_request),
        )
        .route(
            "/user/decline-friend-request",
            post(routes::user::decline_friend_request),
        )
        .route(
            "/user/cancel-friend-request",
            post(routes::user::cancel_friend_request),
        )
        .route("/user/remove-friend", post(routes::user::remove_friend))
        .route_layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}

/// 挂载前缀，空前缀时直接使用根路由
fn base_path(api_base_uri: &str) -> Option<String> {
    let trimmed = api_base_uri.trim().trim_matches('/');
    (!trimmed.is_empty()).then(|| format!("/{}", trimmed))
}

// 创建主路由
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth_routes())
        .merge(poi_routes())
        .merge(user_routes(state.clone()));

    let router = match base_path(&state.config.api_base_uri) {
        Some(base) => Router::new().nest(&base, api),
        None => api,
    };

    // 超时后丢弃处理中的 future，进行中的存储调用随之取消
    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(state.config.request_timeout());

    let router = router
        .layer(axum::middleware::from_fn(log_errors))
        .layer(timeout)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http());

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
