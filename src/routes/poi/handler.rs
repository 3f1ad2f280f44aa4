use axum::extract::{Json, Query, State, rejection::QueryRejection};

use crate::{
    AppState,
    error::AppError,
    models::GeoPoint,
    routes::{clamp_radius, required},
    utils::{ApiResponse, success_to_api_response},
};

use super::model::{PoiQuery, PoiSearchResponse};

#[axum::debug_handler]
pub async fn nearby_pois(
    State(state): State<AppState>,
    query: Result<Query<PoiQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<PoiSearchResponse>>, AppError> {
    let Query(query) = query?;
    let latitude = required(query.lat, "lat")?;
    let longitude = required(query.lon, "lon")?;
    let radius = clamp_radius(query.radius, state.config.max_search_radius);

    let result = state
        .proximity
        .find_pois(GeoPoint::new(longitude, latitude), radius, query.category)
        .await?;

    Ok(success_to_api_response(result.into()))
}
