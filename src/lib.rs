use std::sync::Arc;

use cache::GeoCache;
use config::Config;
use database::RecordStore;
use services::{AuthService, PresenceService, ProximityService, SocialService};

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod router;
pub mod routes;
pub mod seed;
pub mod services;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub presence: Arc<PresenceService>,
    pub proximity: Arc<ProximityService>,
    pub social: Arc<SocialService>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// 用给定的持久层与缓存装配所有服务
    pub fn new(config: Config, store: Arc<dyn RecordStore>, cache: Arc<dyn GeoCache>) -> Self {
        let presence = Arc::new(PresenceService::new(
            store.clone(),
            cache.clone(),
            config.cache_policy(),
        ));
        let proximity = Arc::new(ProximityService::new(cache, presence.clone()));
        let social = Arc::new(SocialService::new(
            store.clone(),
            presence.clone(),
            proximity.clone(),
        ));
        let auth = Arc::new(AuthService::new(
            store,
            presence.clone(),
            config.jwt_secret.clone(),
            config.jwt_expiration(),
            config.bcrypt_cost,
        ));

        Self {
            config,
            presence,
            proximity,
            social,
            auth,
        }
    }
}
