use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{GeoCache, GeoHit};
use crate::error::StoreResult;
use crate::models::GeoPoint;

/// 与 Redis 一致：距离保留4位小数
fn round_distance(meters: f64) -> f64 {
    (meters * 10_000.0).round() / 10_000.0
}

/// 与 Redis 一致：索引范围外的坐标直接报错
fn check_indexable(point: &GeoPoint) -> StoreResult<()> {
    if point.is_indexable() {
        return Ok(());
    }
    Err(redis::RedisError::from((
        redis::ErrorKind::ResponseError,
        "invalid longitude,latitude pair",
        format!("{},{}", point.longitude, point.latitude),
    ))
    .into())
}

#[derive(Debug, Clone)]
struct Payload {
    data: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct GeoSet {
    members: HashMap<String, GeoPoint>,
    expires_at: Option<Instant>,
}

impl GeoSet {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Inner {
    payloads: HashMap<String, Payload>,
    geo_sets: HashMap<String, GeoSet>,
}

/// 进程内缓存，距离计算、坐标范围与过期语义对齐 Redis（键级过期、惰性删除）
#[derive(Default)]
pub struct MemoryGeoCache {
    inner: Mutex<Inner>,
}

impl MemoryGeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前未过期的GEO成员数
    pub fn geo_len(&self, set: &str) -> usize {
        let inner = self.lock();
        inner
            .geo_sets
            .get(set)
            .filter(|s| s.is_live(Instant::now()))
            .map_or(0, |s| s.members.len())
    }

    /// 载荷剩余存活时间
    pub fn payload_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .payloads
            .get(key)
            .and_then(|p| p.expires_at.checked_duration_since(now))
    }
}

#[async_trait]
impl GeoCache for MemoryGeoCache {
    async fn get_payload(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.payloads.get(key) {
            Some(p) if p.expires_at > now => Ok(Some(p.data.clone())),
            Some(_) => {
                inner.payloads.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_payload(&self, key: &str, payload: &str, ttl: Duration) -> StoreResult<()> {
        self.lock().payloads.insert(
            key.to_string(),
            Payload {
                data: payload.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove_payload(&self, key: &str) -> StoreResult<()> {
        self.lock().payloads.remove(key);
        Ok(())
    }

    async fn geo_add(
        &self,
        set: &str,
        member: &str,
        point: GeoPoint,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        check_indexable(&point)?;
        let now = Instant::now();
        let mut inner = self.lock();
        let geo_set = inner.geo_sets.entry(set.to_string()).or_default();
        if !geo_set.is_live(now) {
            *geo_set = GeoSet::default();
        }
        geo_set.members.insert(member.to_string(), point);
        if let Some(ttl) = ttl {
            geo_set.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn geo_remove(&self, set: &str, member: &str) -> StoreResult<()> {
        if let Some(geo_set) = self.lock().geo_sets.get_mut(set) {
            geo_set.members.remove(member);
        }
        Ok(())
    }

    async fn geo_radius(
        &self,
        set: &str,
        center: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> StoreResult<Vec<GeoHit>> {
        check_indexable(&center)?;
        let now = Instant::now();
        let inner = self.lock();
        let Some(geo_set) = inner.geo_sets.get(set).filter(|s| s.is_live(now)) else {
            return Ok(Vec::new());
        };

        // 用精确距离筛选，返回舍入后的距离
        let mut hits: Vec<GeoHit> = geo_set
            .members
            .iter()
            .map(|(member, point)| (member, point, center.distance_to(point)))
            .filter(|(_, _, distance)| *distance <= radius_m)
            .map(|(member, point, distance)| GeoHit {
                member: member.clone(),
                distance_m: round_distance(distance),
                point: *point,
            })
            .collect();

        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.payloads.clear();
        inner.geo_sets.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn radius_query_is_sorted_and_bounded() {
        let cache = MemoryGeoCache::new();
        let center = GeoPoint::new(103.85, 1.29);
        for (i, offset) in [0.02, 0.0, 0.01, 0.5].iter().enumerate() {
            let point = GeoPoint::new(center.longitude + offset, center.latitude);
            cache
                .geo_add("pois:geo", &format!("p{i}"), point, None)
                .await
                .unwrap();
        }

        let hits = cache.geo_radius("pois:geo", center, 5000.0, 50).await.unwrap();
        let members: Vec<_> = hits.iter().map(|h| h.member.as_str()).collect();
        assert_eq!(members, vec!["p1", "p2", "p0"]);

        let limited = cache.geo_radius("pois:geo", center, 5000.0, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_disappear() {
        let cache = MemoryGeoCache::new();
        cache
            .put_payload("entity:a", "{}", Duration::ZERO)
            .await
            .unwrap();
        cache
            .geo_add("users:geo", "a", GeoPoint::default(), Some(Duration::ZERO))
            .await
            .unwrap();

        assert!(cache.get_payload("entity:a").await.unwrap().is_none());
        assert_eq!(cache.geo_len("users:geo"), 0);
        let hits = cache
            .geo_radius("users:geo", GeoPoint::default(), 1000.0, 50)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn distances_are_rounded_to_four_decimals() {
        let cache = MemoryGeoCache::new();
        let center = GeoPoint::new(103.85, 1.29);
        let point = GeoPoint::new(103.8537, 1.2911);
        cache.geo_add("pois:geo", "p", point, None).await.unwrap();

        let exact = center.distance_to(&point);
        let hits = cache.geo_radius("pois:geo", center, exact, 50).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance_m, (exact * 10_000.0).round() / 10_000.0);
        assert!((hits[0].distance_m - exact).abs() <= 0.00005);
    }

    #[tokio::test]
    async fn polar_coordinates_are_rejected() {
        let cache = MemoryGeoCache::new();
        let polar = GeoPoint::new(0.0, 86.0);

        assert!(cache.geo_add("pois:geo", "p", polar, None).await.is_err());
        assert!(cache.geo_radius("pois:geo", polar, 1000.0, 50).await.is_err());
        assert_eq!(cache.geo_len("pois:geo"), 0);

        cache
            .geo_add("pois:geo", "p", polar.indexed(), None)
            .await
            .unwrap();
        assert_eq!(cache.geo_len("pois:geo"), 1);
    }

    #[tokio::test]
    async fn flush_clears_everything() {
        let cache = MemoryGeoCache::new();
        cache
            .put_payload("entity:a", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .geo_add("pois:geo", "a", GeoPoint::default(), None)
            .await
            .unwrap();

        cache.flush().await.unwrap();

        assert!(cache.get_payload("entity:a").await.unwrap().is_none());
        assert_eq!(cache.geo_len("pois:geo"), 0);
    }
}
