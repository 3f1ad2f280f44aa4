//! 持久层
//!
//! 所有字段的权威值都在这里，缓存只持有派生副本。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::error::StoreResult;
use crate::models::{
    Credentials, Entity, EntityKind, FriendGraph, GeoPoint, GraphUpdate, NewCredentials,
    NewEntity,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 按 public_id 查询实体
    async fn find_entity(&self, public_id: &str) -> StoreResult<Option<Entity>>;

    async fn insert_entity(&self, entity: NewEntity) -> StoreResult<Entity>;

    /// 写入用户实体与凭据，用户名或邮箱重复时返回 Duplicate
    async fn insert_user(
        &self,
        entity: NewEntity,
        credentials: NewCredentials,
    ) -> StoreResult<Entity>;

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<Credentials>>;

    /// 更新位置并返回更新后的实体，实体不存在时返回 None
    async fn update_position(
        &self,
        public_id: &str,
        position: GeoPoint,
        located_at: DateTime<Utc>,
    ) -> StoreResult<Option<Entity>>;

    async fn count_entities(&self, kind: EntityKind) -> StoreResult<i64>;

    /// 逐条读取某类实体
    fn stream_entities(&self, kind: EntityKind) -> BoxStream<'_, StoreResult<Entity>>;

    async fn friend_graph(&self, public_id: &str) -> StoreResult<Option<FriendGraph>>;

    /// 按顺序应用好友关系编辑；任一用户不存在时返回 Missing
    async fn apply_graph_updates(&self, updates: &[GraphUpdate]) -> StoreResult<()>;
}
