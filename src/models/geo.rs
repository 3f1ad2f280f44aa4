use serde::{Deserialize, Serialize};

/// Redis GEO 使用的地球半径（米），与缓存侧计算保持一致
pub const EARTH_RADIUS_METERS: f64 = 6_372_797.560856;

/// GEO 索引可接受的最大纬度（Web Mercator 上限）
pub const MAX_INDEXED_LATITUDE: f64 = 85.05112878;

/// 经纬度坐标点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// 纬度在 [-90, 90]、经度在 [-180, 180] 内才有效，NaN 无效
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// 写入或查询GEO索引时使用的坐标，纬度截断到索引可接受的范围
    pub fn indexed(&self) -> GeoPoint {
        GeoPoint::new(
            self.longitude,
            self.latitude.clamp(-MAX_INDEXED_LATITUDE, MAX_INDEXED_LATITUDE),
        )
    }

    /// 能否原样写入GEO索引
    pub fn is_indexable(&self) -> bool {
        self.is_valid() && self.latitude.abs() <= MAX_INDEXED_LATITUDE
    }

    /// 到另一点的球面距离（米）
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        calculate_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

// Haversine 公式
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_METERS * c
}
