use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use super::presence::PresenceService;
use crate::cache::GeoCache;
use crate::cache::keys::geo_key;
use crate::error::AppError;
use crate::models::{Entity, EntityKind, GeoPoint};

/// 单次半径查询返回的最大条数
pub const MAX_RESULTS: usize = 50;

/// 缓存距离保留4位小数（米），复查半径时允许的舍入误差
const DISTANCE_TOLERANCE_M: f64 = 1e-3;

/// 查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct NearbyFilter {
    /// 兴趣点分类，对应 attributes.type
    pub category: Option<String>,
    /// 排除的实体，通常是查询者自己
    pub exclude: Option<String>,
    /// 只保留集合内的实体
    pub members: Option<BTreeSet<String>>,
}

impl NearbyFilter {
    pub fn category(category: Option<String>) -> Self {
        Self {
            category: category.filter(|c| !c.is_empty()),
            ..Self::default()
        }
    }

    pub fn excluding(public_id: &str) -> Self {
        Self {
            exclude: Some(public_id.to_string()),
            ..Self::default()
        }
    }

    pub fn within(mut self, members: BTreeSet<String>) -> Self {
        self.members = Some(members);
        self
    }

    /// 只看成员名即可判断的条件，避免无谓的载荷读取
    fn accepts_member(&self, member: &str) -> bool {
        if self.exclude.as_deref() == Some(member) {
            return false;
        }
        self.members.as_ref().is_none_or(|m| m.contains(member))
    }

    fn accepts_entity(&self, entity: &Entity) -> bool {
        match &self.category {
            Some(category) => entity.category() == Some(category.as_str()),
            None => true,
        }
    }
}

/// 命中的实体及其距离（米）与索引中的坐标，极地实体为真实坐标
#[derive(Debug, Clone, Serialize)]
pub struct NearbyHit {
    pub entity: Entity,
    pub distance: f64,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyResult {
    pub hits: Vec<NearbyHit>,
    pub count: usize,
    pub origin: GeoPoint,
    pub radius: f64,
}

pub struct ProximityService {
    cache: Arc<dyn GeoCache>,
    presence: Arc<PresenceService>,
}

impl ProximityService {
    pub fn new(cache: Arc<dyn GeoCache>, presence: Arc<PresenceService>) -> Self {
        Self { cache, presence }
    }

    /// 半径查询，结果按距离升序
    pub async fn find_nearby(
        &self,
        kind: EntityKind,
        origin: GeoPoint,
        radius_m: f64,
        filter: &NearbyFilter,
    ) -> Result<NearbyResult, AppError> {
        if !origin.is_valid() {
            return Err(AppError::InvalidInput(format!(
                "无效坐标: lat={}, lon={}",
                origin.latitude, origin.longitude
            )));
        }
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(AppError::InvalidInput(format!("无效半径: {}", radius_m)));
        }

        let set = geo_key(kind);
        let raw = self
            .cache
            .geo_radius(set, origin.indexed(), radius_m, MAX_RESULTS)
            .await
            .inspect_err(|e| tracing::error!(set, error = %e, "radius query failed"))?;

        let live_window = self.presence.policy().live_location_ttl;
        let mut hits = Vec::with_capacity(raw.len());
        for hit in raw {
            if !filter.accepts_member(&hit.member) {
                continue;
            }

            let entity = match self.presence.get_entity(&hit.member).await {
                Ok(entity) => entity,
                // 持久层已无此实体，顺手清理索引成员
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(member = %hit.member, "dropping geo member without entity");
                    self.evict(set, &hit.member).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(member = %hit.member, error = %e, "skipping unresolvable geo hit");
                    continue;
                }
            };
            if entity.kind != kind {
                continue;
            }
            // 索引整体续期不代表每个成员都新鲜，超过实时窗口的位置视为离线
            if kind == EntityKind::User && !entity.located_within(live_window) {
                tracing::debug!(member = %hit.member, "dropping user with stale location");
                self.evict(set, &hit.member).await;
                continue;
            }
            if !filter.accepts_entity(&entity) {
                continue;
            }

            // 极地坐标在索引中被截断，距离与坐标改用真实位置
            let (distance, point) = if origin.is_indexable() && entity.position.is_indexable() {
                (hit.distance_m, hit.point)
            } else {
                (origin.distance_to(&entity.position), entity.position)
            };
            if distance > radius_m + DISTANCE_TOLERANCE_M {
                tracing::debug!(member = %hit.member, distance, radius_m, "dropping hit outside radius");
                continue;
            }

            hits.push(NearbyHit {
                entity,
                distance,
                point,
            });
        }

        // 截断坐标重算距离后顺序可能变化
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        Ok(NearbyResult {
            count: hits.len(),
            hits,
            origin,
            radius: radius_m,
        })
    }

    /// 从GEO索引移除失效成员，失败只记录
    async fn evict(&self, set: &str, member: &str) {
        if let Err(e) = self.cache.geo_remove(set, member).await {
            tracing::warn!(member, error = %e, "failed to remove stale geo member");
        }
    }

    /// 兴趣点查询，半径必须为正
    pub async fn find_pois(
        &self,
        origin: GeoPoint,
        radius_m: f64,
        category: Option<String>,
    ) -> Result<NearbyResult, AppError> {
        if radius_m.is_nan() || radius_m <= 0.0 {
            return Err(AppError::InvalidInput("搜索半径必须大于0".into()));
        }
        self.find_nearby(
            EntityKind::Poi,
            origin,
            radius_m,
            &NearbyFilter::category(category),
        )
        .await
    }
}
