use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use super::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Credentials, Entity, EntityKind, FriendGraph, GeoPoint, GraphUpdate, NewCredentials,
    NewEntity,
};

#[derive(Debug, Clone)]
struct Record {
    entity: Entity,
    graph: FriendGraph,
}

#[derive(Debug, Clone)]
struct StoredCredentials {
    public_id: String,
    email: String,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: HashMap<String, Record>,
    credentials: HashMap<String, StoredCredentials>,
}

impl Inner {
    fn insert(&mut self, entity: NewEntity) -> StoreResult<Entity> {
        if self.records.contains_key(&entity.public_id) {
            return Err(StoreError::Duplicate(entity.public_id));
        }
        self.next_id += 1;
        let stored = Entity {
            id: self.next_id,
            public_id: entity.public_id,
            display_name: entity.display_name,
            kind: entity.kind,
            position: entity.position,
            attributes: entity.attributes,
            located_at: None,
        };
        self.records.insert(
            stored.public_id.clone(),
            Record {
                entity: stored.clone(),
                graph: FriendGraph::default(),
            },
        );
        Ok(stored)
    }
}

/// 进程内持久层，语义与 PostgreSQL 实现一致（唯一约束、集合更新、事务性）
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_entity(&self, public_id: &str) -> StoreResult<Option<Entity>> {
        Ok(self.lock().records.get(public_id).map(|r| r.entity.clone()))
    }

    async fn insert_entity(&self, entity: NewEntity) -> StoreResult<Entity> {
        self.lock().insert(entity)
    }

    async fn insert_user(
        &self,
        mut entity: NewEntity,
        credentials: NewCredentials,
    ) -> StoreResult<Entity> {
        let mut inner = self.lock();
        let taken = inner.credentials.contains_key(&credentials.username)
            || inner
                .credentials
                .values()
                .any(|c| c.email == credentials.email);
        if taken {
            return Err(StoreError::Duplicate("username or email".to_string()));
        }

        entity.kind = EntityKind::User;
        let stored = inner.insert(entity)?;
        inner.credentials.insert(
            credentials.username,
            StoredCredentials {
                public_id: stored.public_id.clone(),
                email: credentials.email,
                password_hash: credentials.password_hash,
            },
        );
        Ok(stored)
    }

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<Credentials>> {
        Ok(self.lock().credentials.get(username).map(|c| Credentials {
            public_id: c.public_id.clone(),
            username: username.to_string(),
            password_hash: c.password_hash.clone(),
        }))
    }

    async fn update_position(
        &self,
        public_id: &str,
        position: GeoPoint,
        located_at: DateTime<Utc>,
    ) -> StoreResult<Option<Entity>> {
        let mut inner = self.lock();
        Ok(inner.records.get_mut(public_id).map(|record| {
            record.entity.position = position;
            record.entity.located_at = Some(located_at);
            record.entity.clone()
        }))
    }

    async fn count_entities(&self, kind: EntityKind) -> StoreResult<i64> {
        let count = self
            .lock()
            .records
            .values()
            .filter(|r| r.entity.kind == kind)
            .count();
        Ok(count as i64)
    }

    fn stream_entities(&self, kind: EntityKind) -> BoxStream<'_, StoreResult<Entity>> {
        let mut entities: Vec<Entity> = self
            .lock()
            .records
            .values()
            .filter(|r| r.entity.kind == kind)
            .map(|r| r.entity.clone())
            .collect();
        entities.sort_by_key(|e| e.id);
        stream::iter(entities.into_iter().map(Ok)).boxed()
    }

    async fn friend_graph(&self, public_id: &str) -> StoreResult<Option<FriendGraph>> {
        Ok(self
            .lock()
            .records
            .get(public_id)
            .filter(|r| r.entity.is_user())
            .map(|r| r.graph.clone()))
    }

    async fn apply_graph_updates(&self, updates: &[GraphUpdate]) -> StoreResult<()> {
        let mut inner = self.lock();

        // 先整体校验再写入，与事务的全有或全无一致
        for update in updates {
            let is_user = inner
                .records
                .get(&update.public_id)
                .is_some_and(|r| r.entity.is_user());
            if !is_user {
                return Err(StoreError::Missing(update.public_id.clone()));
            }
        }

        for update in updates {
            if let Some(record) = inner.records.get_mut(&update.public_id) {
                record.graph.apply(&update.edits);
            }
        }
        Ok(())
    }
}
