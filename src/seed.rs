// 兴趣点批量导入
// 数据文件是 JSON 数组，坐标为 GeoJSON 顺序 [lon, lat]

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::RecordStore;
use crate::error::AppError;
use crate::models::{EntityKind, GeoPoint, NewEntity};
use crate::services::{PresenceService, ReseedReport};

#[derive(Debug, Deserialize)]
struct SeedLocation {
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct SeedPoi {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    category: String,
    location: SeedLocation,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    address: String,
}

impl SeedPoi {
    fn into_entity(self) -> Result<NewEntity, String> {
        let position = match self.location.coordinates.as_slice() {
            [lon, lat] => GeoPoint::new(*lon, *lat),
            other => return Err(format!("{}: expected [lon, lat], got {:?}", self.name, other)),
        };
        if !position.is_valid() {
            return Err(format!("{}: coordinates out of range", self.name));
        }

        let mut attributes = Map::new();
        attributes.insert("type".into(), Value::String(self.category));
        attributes.insert("description".into(), Value::String(self.description));
        attributes.insert("address".into(), Value::String(self.address));
        attributes.insert(
            "tags".into(),
            Value::Array(self.tags.into_iter().map(Value::String).collect()),
        );

        let public_id = if self.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.id
        };

        Ok(NewEntity {
            public_id,
            display_name: self.name,
            kind: EntityKind::Poi,
            position,
            attributes,
        })
    }
}

/// 解析兴趣点数组，坐标非法的记录跳过
pub fn parse_pois(json: &str) -> Result<Vec<NewEntity>, AppError> {
    let raw: Vec<SeedPoi> = serde_json::from_str(json)
        .map_err(|e| AppError::InvalidInput(format!("invalid POI seed data: {}", e)))?;

    let mut pois = Vec::with_capacity(raw.len());
    for poi in raw {
        match poi.into_entity() {
            Ok(entity) => pois.push(entity),
            Err(reason) => tracing::warn!("Skipping POI seed record: {}", reason),
        }
    }
    Ok(pois)
}

/// 写入兴趣点，已存在的 public_id 跳过，返回新写入条数
pub async fn seed_pois(store: &dyn RecordStore, pois: Vec<NewEntity>) -> Result<usize, AppError> {
    let mut inserted = 0;
    for poi in pois {
        let public_id = poi.public_id.clone();
        match store.insert_entity(poi).await {
            Ok(_) => inserted += 1,
            Err(crate::error::StoreError::Duplicate(_)) => {
                tracing::debug!("POI {} already exists", public_id);
            }
            Err(e) => {
                tracing::error!(%public_id, error = %e, "failed to insert POI");
                return Err(e.into());
            }
        }
    }
    Ok(inserted)
}

/// 启动时导入：持久层没有兴趣点且配置了数据文件时导入，然后重建兴趣点缓存
pub async fn bootstrap_pois(
    store: &dyn RecordStore,
    presence: &PresenceService,
    seed_file: Option<&Path>,
) -> Result<ReseedReport, AppError> {
    let existing = store.count_entities(EntityKind::Poi).await?;

    match seed_file {
        Some(path) if existing == 0 => {
            let json = tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::Internal(format!("failed to read {}: {}", path.display(), e))
            })?;
            let pois = parse_pois(&json)?;
            let inserted = seed_pois(store, pois).await?;
            tracing::info!("Imported {} POIs from {}", inserted, path.display());
        }
        Some(_) => tracing::info!("{} POIs already stored, skipping import", existing),
        None => {}
    }

    presence.reseed_all(&[EntityKind::Poi]).await
}
