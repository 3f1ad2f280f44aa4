use axum::Json;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{ApiResponse, error_codes};

pub type StoreResult<T> = Result<T, StoreError>;

/// 持久层与缓存层的底层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("record not found: {0}")]
    Missing(String),
    #[error("corrupt record {0}: {1}")]
    Corrupt(String, String),
}

impl StoreError {
    /// 唯一约束冲突转换为 Duplicate，其余保持数据库错误
    pub fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(what.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// 服务层对外的错误分类
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    StoreFailure(StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => AppError::Conflict(what),
            StoreError::Missing(what) => AppError::NotFound(what),
            other => AppError::StoreFailure(other),
        }
    }
}

// 请求体与查询参数解析失败统一为参数错误，保持响应格式一致
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::StoreFailure(_) => "STORE_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::InvalidInput(_) => error_codes::VALIDATION_ERROR,
            AppError::Unauthorized => error_codes::AUTH_FAILED,
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::Conflict(_) => error_codes::CONFLICT,
            AppError::StoreFailure(_) => error_codes::STORE_FAILURE,
            AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 存储层细节只写日志，不返回给调用方
        let msg = match &self {
            AppError::InvalidInput(detail)
            | AppError::NotFound(detail)
            | AppError::Conflict(detail) => detail.clone(),
            AppError::Unauthorized => "未授权访问".to_string(),
            AppError::StoreFailure(err) => {
                tracing::error!(kind = self.kind(), "store failure: {}", err);
                "服务暂时不可用，请稍后重试".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!(kind = self.kind(), "internal error: {}", detail);
                "内部服务器错误".to_string()
            }
        };

        let body = Json(ApiResponse::<()> {
            code: self.code(),
            msg,
            resp_data: None,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        assert!(matches!(
            AppError::from(StoreError::Duplicate("username".into())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Missing("u1".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Corrupt("u1".into(), "bad kind".into())),
            AppError::StoreFailure(_)
        ));
    }

    #[test]
    fn store_failure_hides_details() {
        let response =
            AppError::StoreFailure(StoreError::Missing("secret-handle".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
