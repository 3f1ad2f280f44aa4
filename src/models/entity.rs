use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::geo::GeoPoint;

/// 实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Poi,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Poi => "poi",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "poi" => Ok(EntityKind::Poi),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// 用户与兴趣点的统一模型
///
/// `id` 是持久层内部句柄，只在服务内部流转；对外只暴露 `public_id`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub public_id: String,
    pub display_name: String,
    pub kind: EntityKind,
    pub position: GeoPoint,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// 最近一次上报位置的时间，兴趣点与从未上报的用户为空
    #[serde(default)]
    pub located_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn is_user(&self) -> bool {
        self.kind == EntityKind::User
    }

    /// 最近一次上报位置是否在 window 内，从未上报视为过期
    pub fn located_within(&self, window: Duration) -> bool {
        self.located_at.is_some_and(|at| {
            // 时钟回拨导致的未来时间视为新鲜
            Utc::now()
                .signed_duration_since(at)
                .to_std()
                .map_or(true, |age| age <= window)
        })
    }

    /// 兴趣点分类，存放在 attributes.type
    pub fn category(&self) -> Option<&str> {
        self.attributes.get("type").and_then(Value::as_str)
    }
}

/// 写入持久层前的新实体
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub public_id: String,
    pub display_name: String,
    pub kind: EntityKind,
    pub position: GeoPoint,
    pub attributes: Map<String, Value>,
}

/// 注册用户时写入的凭据
#[derive(Debug, Clone)]
pub struct NewCredentials {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub public_id: String,
    pub username: String,
    pub password_hash: String,
}
