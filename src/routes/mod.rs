pub mod auth;
pub mod poi;
pub mod user;

use crate::error::AppError;

/// 必填的数值参数
pub(crate) fn required(value: Option<f64>, name: &str) -> Result<f64, AppError> {
    value.ok_or_else(|| AppError::InvalidInput(format!("缺少参数: {}", name)))
}

/// 半径不超过配置的上限
pub(crate) fn clamp_radius(radius: Option<f64>, max: f64) -> f64 {
    let radius = radius.unwrap_or(0.0);
    if radius > max { max } else { radius }
}
