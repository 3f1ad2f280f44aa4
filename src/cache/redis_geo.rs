use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::keys::PAYLOAD_FIELD;
use super::{GeoCache, GeoHit};
use crate::error::StoreResult;
use crate::models::GeoPoint;

/// Redis 实现，所有请求共享同一个多路复用连接
#[derive(Clone)]
pub struct RedisGeoCache {
    conn: MultiplexedConnection,
}

impl RedisGeoCache {
    pub async fn connect(client: &redis::Client) -> redis::RedisResult<Self> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl GeoCache for RedisGeoCache {
    async fn get_payload(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.hget(key, PAYLOAD_FIELD).await?;
        Ok(payload)
    }

    async fn put_payload(&self, key: &str, payload: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(key, PAYLOAD_FIELD, payload)
            .ignore()
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_payload(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn geo_add(
        &self,
        set: &str,
        member: &str,
        point: GeoPoint,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("GEOADD")
            .arg(set)
            .arg(point.longitude)
            .arg(point.latitude)
            .arg(member)
            .ignore();
        if let Some(ttl) = ttl {
            pipe.expire(set, ttl.as_secs() as i64).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn geo_remove(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        // GEO 索引底层是有序集合
        let _: () = conn.zrem(set, member).await?;
        Ok(())
    }

    async fn geo_radius(
        &self,
        set: &str,
        center: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> StoreResult<Vec<GeoHit>> {
        let mut conn = self.conn.clone();

        // 返回格式：[member, dist, [lon, lat]]，距离按查询单位保留4位小数
        let hits: Vec<(String, f64, (f64, f64))> = redis::cmd("GEORADIUS")
            .arg(set)
            .arg(center.longitude)
            .arg(center.latitude)
            .arg(radius_m)
            .arg("m")
            .arg("WITHDIST")
            .arg("WITHCOORD")
            .arg("COUNT")
            .arg(limit)
            .arg("ASC")
            .query_async(&mut conn)
            .await?;

        Ok(hits
            .into_iter()
            .map(|(member, distance_m, (longitude, latitude))| GeoHit {
                member,
                distance_m,
                point: GeoPoint::new(longitude, latitude),
            })
            .collect())
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}
