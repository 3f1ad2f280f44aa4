use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Credentials, Entity, EntityKind, FriendGraph, GeoPoint, GraphEdit, GraphUpdate,
    NewCredentials, NewEntity, Relation, SetOp,
};

#[derive(Debug, FromRow)]
struct EntityRow {
    id: i64,
    public_id: String,
    display_name: String,
    kind: String,
    longitude: f64,
    latitude: f64,
    attributes: Json<Map<String, Value>>,
    located_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntityRow> for Entity {
    type Error = StoreError;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<EntityKind>()
            .map_err(|e| StoreError::Corrupt(row.public_id.clone(), e))?;

        Ok(Entity {
            id: row.id,
            public_id: row.public_id,
            display_name: row.display_name,
            kind,
            position: GeoPoint::new(row.longitude, row.latitude),
            attributes: row.attributes.0,
            located_at: row.located_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct GraphRow {
    friends: Vec<String>,
    pending_incoming: Vec<String>,
    pending_outgoing: Vec<String>,
}

impl From<GraphRow> for FriendGraph {
    fn from(row: GraphRow) -> Self {
        Self {
            friends: row.friends.into_iter().collect(),
            pending_incoming: row.pending_incoming.into_iter().collect(),
            pending_outgoing: row.pending_outgoing.into_iter().collect(),
        }
    }
}

#[derive(Debug, FromRow)]
struct CredentialsRow {
    public_id: String,
    username: String,
    password_hash: String,
}

/// PostgreSQL 持久层
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// 生成单条好友关系更新语句，$1 为 public_id，其后依次为各条编辑的 peer
fn graph_update_sql(edits: &[GraphEdit]) -> Option<(String, Vec<&str>)> {
    let mut assignments = Vec::new();
    let mut binds: Vec<&str> = Vec::new();

    for relation in Relation::ALL {
        let column = relation.column();
        let mut expr = column.to_string();
        for edit in edits.iter().filter(|e| e.relation == relation) {
            binds.push(&edit.peer);
            let param = binds.len() + 1;
            expr = match edit.op {
                SetOp::Add => format!(
                    "CASE WHEN ${param} = ANY({expr}) THEN {expr} ELSE array_append({expr}, ${param}) END"
                ),
                SetOp::Remove => format!("array_remove({expr}, ${param})"),
            };
        }
        if expr != column {
            assignments.push(format!("{} = {}", column, expr));
        }
    }

    if assignments.is_empty() {
        return None;
    }

    let sql = format!(
        "UPDATE entities SET {} WHERE public_id = $1 AND kind = 'user'",
        assignments.join(", ")
    );
    Some((sql, binds))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_entity(&self, public_id: &str) -> StoreResult<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT id, public_id, display_name, kind, longitude, latitude, attributes, located_at
            FROM entities
            WHERE public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entity::try_from).transpose()
    }

    async fn insert_entity(&self, entity: NewEntity) -> StoreResult<Entity> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            INSERT INTO entities (public_id, display_name, kind, longitude, latitude, attributes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, public_id, display_name, kind, longitude, latitude, attributes, located_at
            "#,
        )
        .bind(&entity.public_id)
        .bind(&entity.display_name)
        .bind(entity.kind.as_str())
        .bind(entity.position.longitude)
        .bind(entity.position.latitude)
        .bind(Json(&entity.attributes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, &entity.public_id))?;

        Entity::try_from(row)
    }

    async fn insert_user(
        &self,
        entity: NewEntity,
        credentials: NewCredentials,
    ) -> StoreResult<Entity> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            INSERT INTO entities (public_id, display_name, kind, longitude, latitude, attributes)
            VALUES ($1, $2, 'user', $3, $4, $5)
            RETURNING id, public_id, display_name, kind, longitude, latitude, attributes, located_at
            "#,
        )
        .bind(&entity.public_id)
        .bind(&entity.display_name)
        .bind(entity.position.longitude)
        .bind(entity.position.latitude)
        .bind(Json(&entity.attributes))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::from_insert(e, &entity.public_id))?;

        sqlx::query(
            r#"
            INSERT INTO credentials (public_id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&entity.public_id)
        .bind(&credentials.username)
        .bind(&credentials.email)
        .bind(&credentials.password_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_insert(e, "username or email"))?;

        tx.commit().await?;

        Entity::try_from(row)
    }

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<Credentials>> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            r#"
            SELECT public_id, username, password_hash
            FROM credentials
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Credentials {
            public_id: r.public_id,
            username: r.username,
            password_hash: r.password_hash,
        }))
    }

    async fn update_position(
        &self,
        public_id: &str,
        position: GeoPoint,
        located_at: DateTime<Utc>,
    ) -> StoreResult<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            UPDATE entities
            SET longitude = $2, latitude = $3, located_at = $4
            WHERE public_id = $1
            RETURNING id, public_id, display_name, kind, longitude, latitude, attributes, located_at
            "#,
        )
        .bind(public_id)
        .bind(position.longitude)
        .bind(position.latitude)
        .bind(located_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entity::try_from).transpose()
    }

    async fn count_entities(&self, kind: EntityKind) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    fn stream_entities(&self, kind: EntityKind) -> BoxStream<'_, StoreResult<Entity>> {
        sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT id, public_id, display_name, kind, longitude, latitude, attributes, located_at
            FROM entities
            WHERE kind = $1
            ORDER BY id
            "#,
        )
        .bind(kind.as_str())
        .fetch(&self.pool)
        .map(|row| row.map_err(StoreError::from).and_then(Entity::try_from))
        .boxed()
    }

    async fn friend_graph(&self, public_id: &str) -> StoreResult<Option<FriendGraph>> {
        let row = sqlx::query_as::<_, GraphRow>(
            r#"
            SELECT friends, pending_incoming, pending_outgoing
            FROM entities
            WHERE public_id = $1 AND kind = 'user'
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FriendGraph::from))
    }

    async fn apply_graph_updates(&self, updates: &[GraphUpdate]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for update in updates {
            let Some((sql, binds)) = graph_update_sql(&update.edits) else {
                continue;
            };

            let mut query = sqlx::query(&sql).bind(&update.public_id);
            for peer in binds {
                query = query.bind(peer);
            }

            let result = query.execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                // tx 被丢弃时自动回滚
                return Err(StoreError::Missing(update.public_id.clone()));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_sql_numbers_parameters_after_public_id() {
        let edits = vec![
            GraphEdit::add(Relation::Friends, "bob"),
            GraphEdit::remove(Relation::PendingOutgoing, "bob"),
        ];
        let (sql, binds) = graph_update_sql(&edits).expect("non-empty update");

        assert_eq!(binds, vec!["bob", "bob"]);
        assert!(sql.contains("friends = CASE WHEN $2 = ANY(friends)"));
        assert!(sql.contains("pending_outgoing = array_remove(pending_outgoing, $3)"));
        assert!(!sql.contains("pending_incoming ="));
        assert!(sql.ends_with("WHERE public_id = $1 AND kind = 'user'"));
    }

    #[test]
    fn graph_sql_nests_edits_on_same_column() {
        let edits = vec![
            GraphEdit::remove(Relation::PendingIncoming, "a"),
            GraphEdit::remove(Relation::PendingIncoming, "b"),
        ];
        let (sql, _) = graph_update_sql(&edits).expect("non-empty update");
        assert!(sql.contains("array_remove(array_remove(pending_incoming, $2), $3)"));
    }

    #[test]
    fn empty_edits_produce_no_statement() {
        assert!(graph_update_sql(&[]).is_none());
    }
}
