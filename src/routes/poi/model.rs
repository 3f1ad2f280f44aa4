use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::GeoPoint;
use crate::services::{NearbyHit, NearbyResult};

#[derive(Debug, Deserialize)]
pub struct PoiQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<f64>,
    #[serde(rename = "type")]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PoiInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub attributes: Map<String, Value>,
    pub longitude: f64,
    pub latitude: f64,
    /// 距查询中心的距离（米）
    pub distance: f64,
}

impl From<NearbyHit> for PoiInfo {
    fn from(hit: NearbyHit) -> Self {
        Self {
            category: hit.entity.category().map(str::to_string),
            id: hit.entity.public_id,
            name: hit.entity.display_name,
            attributes: hit.entity.attributes,
            longitude: hit.point.longitude,
            latitude: hit.point.latitude,
            distance: hit.distance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PoiSearchResponse {
    pub pois: Vec<PoiInfo>,
    pub count: usize,
    pub center: GeoPoint,
    pub radius: f64,
}

impl From<NearbyResult> for PoiSearchResponse {
    fn from(result: NearbyResult) -> Self {
        Self {
            pois: result.hits.into_iter().map(PoiInfo::from).collect(),
            count: result.count,
            center: result.origin,
            radius: result.radius,
        }
    }
}
