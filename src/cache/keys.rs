use std::time::Duration;

use crate::models::EntityKind;

/// 实体载荷缓存键前缀
const ENTITY_PREFIX: &str = "entity:";

/// 载荷哈希中存放序列化实体的字段
pub const PAYLOAD_FIELD: &str = "data";

/// 用户GEO索引键
pub const USER_GEO_KEY: &str = "users:geo";

/// 兴趣点GEO索引键
pub const POI_GEO_KEY: &str = "pois:geo";

/// 通用实体缓存过期时间
pub const ENTITY_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// 实时位置与用户GEO索引过期时间
pub const LIVE_LOCATION_TTL: Duration = Duration::from_secs(5 * 60);

/// 生成实体缓存键
pub fn entity_key(public_id: &str) -> String {
    format!("{}{}", ENTITY_PREFIX, public_id)
}

/// 按实体类型选择GEO索引
pub fn geo_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => USER_GEO_KEY,
        EntityKind::Poi => POI_GEO_KEY,
    }
}

/// 缓存过期策略，过期由缓存自身完成，服务不做主动清理
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub entity_ttl: Duration,
    pub live_location_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            entity_ttl: ENTITY_CACHE_TTL,
            live_location_ttl: LIVE_LOCATION_TTL,
        }
    }
}

impl CachePolicy {
    /// 重建缓存时载荷的过期时间
    pub fn payload_ttl(&self, kind: EntityKind) -> Duration {
        match kind {
            EntityKind::User => self.live_location_ttl,
            EntityKind::Poi => self.entity_ttl,
        }
    }

    /// GEO 索引整体过期时间，兴趣点索引不过期
    pub fn geo_ttl(&self, kind: EntityKind) -> Option<Duration> {
        match kind {
            EntityKind::User => Some(self.live_location_ttl),
            EntityKind::Poi => None,
        }
    }
}
