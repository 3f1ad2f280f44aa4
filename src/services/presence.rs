use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::TryStreamExt;
use serde::Serialize;

use crate::cache::keys::{USER_GEO_KEY, entity_key, geo_key};
use crate::cache::{CachePolicy, GeoCache};
use crate::database::RecordStore;
use crate::error::{AppError, StoreResult};
use crate::models::{Entity, EntityKind, GeoPoint};

/// 重建缓存的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReseedReport {
    pub seeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 持久层与缓存之间的桥接：旁路缓存读取、双写更新、整体重建
pub struct PresenceService {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn GeoCache>,
    policy: CachePolicy,
}

impl PresenceService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn GeoCache>, policy: CachePolicy) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// 旁路缓存读取实体，未命中时回源并回填缓存
    pub async fn get_entity(&self, public_id: &str) -> Result<Entity, AppError> {
        if public_id.is_empty() {
            return Err(AppError::NotFound("实体不存在".into()));
        }

        let key = entity_key(public_id);
        match self.cache.get_payload(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<Entity>(&json) {
                Ok(entity) => {
                    tracing::debug!("Get entity from cache: {}", key);
                    return Ok(entity);
                }
                Err(e) => {
                    tracing::warn!(public_id, error = %e, "cached entity payload is unreadable");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(public_id, error = %e, "entity cache read failed, falling back to store");
            }
        }

        let entity = self
            .store
            .find_entity(public_id)
            .await
            .inspect_err(|e| tracing::error!(public_id, error = %e, "entity lookup failed"))?
            .ok_or_else(|| AppError::NotFound("实体不存在".into()))?;

        if let Err(e) = self.cache_entity(&entity, self.policy.entity_ttl).await {
            tracing::warn!(public_id, error = %e, "failed to repopulate entity cache");
        } else {
            tracing::debug!("Set entity to cache: {}", key);
        }

        Ok(entity)
    }

    /// 写入实体载荷
    pub async fn cache_entity(&self, entity: &Entity, ttl: Duration) -> StoreResult<()> {
        let json = serde_json::to_string(entity)?;
        self.cache
            .put_payload(&entity_key(&entity.public_id), &json, ttl)
            .await
    }

    /// 更新调用者位置：先写持久层，再刷新缓存与用户GEO索引
    pub async fn update_location(
        &self,
        caller_id: &str,
        longitude: f64,
        latitude: f64,
    ) -> Result<(), AppError> {
        if caller_id.is_empty() {
            return Err(AppError::Unauthorized);
        }
        let position = GeoPoint::new(longitude, latitude);
        if !position.is_valid() {
            return Err(AppError::InvalidInput(format!(
                "无效坐标: lat={}, lon={}",
                latitude, longitude
            )));
        }

        let caller = self.get_entity(caller_id).await?;
        if !caller.is_user() {
            return Err(AppError::Unauthorized);
        }

        tracing::info!(
            "Updating location for user {}: lat={}, lon={}",
            caller_id,
            latitude,
            longitude
        );

        let updated = self
            .store
            .update_position(caller_id, position, Utc::now())
            .await
            .inspect_err(
                |e| tracing::error!(public_id = caller_id, error = %e, "durable location update failed"),
            )?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;

        // 持久层已成功，缓存失败只记录风险，不影响结果
        if let Err(e) = self.refresh_live_location(&updated).await {
            tracing::warn!(
                public_id = caller_id,
                error = %e,
                "cache refresh failed after location update, stale cache risk"
            );
            if let Err(e) = self.cache.remove_payload(&entity_key(caller_id)).await {
                tracing::warn!(public_id = caller_id, error = %e, "failed to drop stale entity payload");
            }
        }

        Ok(())
    }

    async fn refresh_live_location(&self, entity: &Entity) -> StoreResult<()> {
        let ttl = self.policy.live_location_ttl;
        self.cache_entity(entity, ttl).await?;
        self.cache
            .geo_add(
                USER_GEO_KEY,
                &entity.public_id,
                entity.position.indexed(),
                Some(ttl),
            )
            .await
    }

    /// 清空缓存并从持久层重建指定类型的载荷与GEO索引
    ///
    /// 不与在线流量互斥：读请求会走回源，与重建并发的写入可能被覆盖。
    pub async fn reseed_all(&self, kinds: &[EntityKind]) -> Result<ReseedReport, AppError> {
        self.cache
            .flush()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to flush cache before reseed"))?;

        let mut report = ReseedReport::default();
        for &kind in kinds {
            let geo_set = geo_key(kind);
            let mut entities = self.store.stream_entities(kind);

            while let Some(entity) = entities
                .try_next()
                .await
                .inspect_err(|e| tracing::error!(%kind, error = %e, "failed to stream entities"))?
            {
                // 从未上报或超出实时窗口的用户不进入GEO索引
                if kind == EntityKind::User
                    && !entity.located_within(self.policy.live_location_ttl)
                {
                    report.skipped += 1;
                    continue;
                }

                match self.seed_one(&entity, geo_set).await {
                    Ok(()) => report.seeded += 1,
                    Err(e) => {
                        tracing::warn!(public_id = %entity.public_id, error = %e, "failed to seed entity");
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Reseeded cache: {} seeded, {} skipped, {} failed",
            report.seeded,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    async fn seed_one(&self, entity: &Entity, geo_set: &str) -> StoreResult<()> {
        self.cache_entity(entity, self.policy.payload_ttl(entity.kind))
            .await?;
        self.cache
            .geo_add(
                geo_set,
                &entity.public_id,
                entity.position.indexed(),
                self.policy.geo_ttl(entity.kind),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::POI_GEO_KEY;
    use crate::services::testing::{FailingCache, Fixture};

    #[tokio::test]
    async fn miss_reads_store_and_repopulates_cache() {
        let fx = Fixture::new();
        fx.add_user("alice", 103.85, 1.29).await;

        let entity = fx.presence.get_entity("alice").await.unwrap();
        assert_eq!(entity.display_name, "Alice");

        let ttl = fx.cache.payload_ttl("entity:alice").expect("payload cached");
        assert!(ttl > Duration::from_secs(23 * 3600));
    }

    #[tokio::test]
    async fn hit_is_served_from_cache() {
        let fx = Fixture::new();
        let mut entity = fx.add_user("alice", 103.85, 1.29).await;
        entity.display_name = "Cached Alice".into();
        fx.presence
            .cache_entity(&entity, Duration::from_secs(60))
            .await
            .unwrap();

        let read = fx.presence.get_entity("alice").await.unwrap();
        assert_eq!(read.display_name, "Cached Alice");
    }

    #[tokio::test]
    async fn unreadable_payload_falls_back_to_store() {
        let fx = Fixture::new();
        fx.add_user("alice", 103.85, 1.29).await;
        fx.cache
            .put_payload("entity:alice", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let read = fx.presence.get_entity("alice").await.unwrap();
        assert_eq!(read.public_id, "alice");
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let fx = Fixture::new();
        let err = fx.presence.get_entity("nobody").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_then_get_returns_new_coordinates() {
        let fx = Fixture::new();
        fx.add_user("alice", 0.0, 0.0).await;
        // 先读一次，让旧位置进入缓存
        fx.presence.get_entity("alice").await.unwrap();

        for (lon, lat) in [(103.85, 1.29), (-180.0, -90.0), (180.0, 90.0)] {
            fx.presence.update_location("alice", lon, lat).await.unwrap();
            let entity = fx.presence.get_entity("alice").await.unwrap();
            assert_eq!(entity.position, GeoPoint::new(lon, lat));
            assert!(entity.located_at.is_some());
        }

        assert_eq!(fx.cache.geo_len(USER_GEO_KEY), 1);
        let ttl = fx.cache.payload_ttl("entity:alice").unwrap();
        assert!(ttl <= Duration::from_secs(300));
    }

    #[tokio::test]
    async fn invalid_coordinates_leave_position_unchanged() {
        let fx = Fixture::new();
        fx.add_user("alice", 103.85, 1.29).await;

        for (lon, lat) in [(200.0, 1.0), (1.0, 91.0), (f64::NAN, 0.0)] {
            let err = fx.presence.update_location("alice", lon, lat).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)));
        }

        let stored = fx.store.find_entity("alice").await.unwrap().unwrap();
        assert_eq!(stored.position, GeoPoint::new(103.85, 1.29));
        assert_eq!(fx.cache.geo_len(USER_GEO_KEY), 0);
    }

    #[tokio::test]
    async fn caller_must_exist_and_be_a_user() {
        let fx = Fixture::new();
        fx.add_poi("cafe", "Cafe", "food", 103.85, 1.29).await;

        assert!(matches!(
            fx.presence.update_location("", 1.0, 1.0).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            fx.presence.update_location("ghost", 1.0, 1.0).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.presence.update_location("cafe", 1.0, 1.0).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn cache_failure_after_durable_write_still_succeeds() {
        let fx = Fixture::new();
        fx.add_user("alice", 0.0, 0.0).await;
        let presence = PresenceService::new(
            fx.store.clone(),
            Arc::new(FailingCache),
            CachePolicy::default(),
        );

        presence.update_location("alice", 103.85, 1.29).await.unwrap();

        let stored = fx.store.find_entity("alice").await.unwrap().unwrap();
        assert_eq!(stored.position, GeoPoint::new(103.85, 1.29));
    }

    #[tokio::test]
    async fn reseed_rebuilds_payloads_and_geo_sets() {
        let fx = Fixture::new();
        fx.add_poi("cafe", "Cafe", "food", 103.85, 1.29).await;
        fx.add_poi("park", "Park", "nature", 103.86, 1.30).await;
        fx.add_user("alice", 0.0, 0.0).await;
        fx.add_user("bob", 0.0, 0.0).await;
        fx.store
            .update_position("bob", GeoPoint::new(103.85, 1.29), Utc::now())
            .await
            .unwrap();
        // 很久以前上报过的用户
        fx.add_user("carol", 0.0, 0.0).await;
        fx.store
            .update_position(
                "carol",
                GeoPoint::new(103.85, 1.29),
                Utc::now() - chrono::Duration::hours(2),
            )
            .await
            .unwrap();
        fx.cache
            .put_payload("entity:stale", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        let report = fx
            .presence
            .reseed_all(&[EntityKind::Poi, EntityKind::User])
            .await
            .unwrap();

        assert_eq!(
            report,
            ReseedReport {
                seeded: 3,
                skipped: 2,
                failed: 0
            }
        );
        assert_eq!(fx.cache.geo_len(POI_GEO_KEY), 2);
        assert_eq!(fx.cache.geo_len(USER_GEO_KEY), 1);
        assert!(fx.cache.get_payload("entity:stale").await.unwrap().is_none());
        assert!(fx.cache.get_payload("entity:cafe").await.unwrap().is_some());
        assert!(fx.cache.get_payload("entity:carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn polar_location_update_enters_the_index() {
        let fx = Fixture::new();
        fx.add_user("alice", 0.0, 0.0).await;

        fx.presence.update_location("alice", 12.0, 88.0).await.unwrap();

        let entity = fx.presence.get_entity("alice").await.unwrap();
        assert_eq!(entity.position, GeoPoint::new(12.0, 88.0));
        assert_eq!(fx.cache.geo_len(USER_GEO_KEY), 1);
    }
}
