// 缓存模块
// 实体载荷缓存与GEO索引，只保存持久层数据的派生副本

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::GeoPoint;

pub mod keys;
pub mod memory;
pub mod redis_geo;

pub use keys::CachePolicy;
pub use memory::MemoryGeoCache;
pub use redis_geo::RedisGeoCache;

/// 半径查询命中项，距离单位为米
///
/// 缓存返回的距离保留4位小数，调用方比较半径时需留出舍入余量。
#[derive(Debug, Clone, PartialEq)]
pub struct GeoHit {
    pub member: String,
    pub distance_m: f64,
    pub point: GeoPoint,
}

#[async_trait]
pub trait GeoCache: Send + Sync {
    /// 读取序列化的实体载荷
    async fn get_payload(&self, key: &str) -> StoreResult<Option<String>>;

    /// 写入载荷并设置过期时间
    async fn put_payload(&self, key: &str, payload: &str, ttl: Duration) -> StoreResult<()>;

    async fn remove_payload(&self, key: &str) -> StoreResult<()>;

    /// 写入或更新GEO成员；ttl 不为空时刷新整个索引的过期时间
    ///
    /// 纬度超出 ±MAX_INDEXED_LATITUDE 时返回错误，调用方应先 `GeoPoint::indexed`。
    async fn geo_add(
        &self,
        set: &str,
        member: &str,
        point: GeoPoint,
        ttl: Option<Duration>,
    ) -> StoreResult<()>;

    async fn geo_remove(&self, set: &str, member: &str) -> StoreResult<()>;

    /// 以 center 为圆心查询 radius_m 米内的成员，按距离升序，最多 limit 条
    async fn geo_radius(
        &self,
        set: &str,
        center: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> StoreResult<Vec<GeoHit>>;

    /// 清空整个缓存
    async fn flush(&self) -> StoreResult<()>;
}
