use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CachePolicy;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub max_search_radius: f64,
    pub request_timeout_secs: u64,
    pub entity_cache_ttl_secs: u64,
    pub live_location_ttl_secs: u64,
    pub bcrypt_cost: u32,
    pub db_max_connections: u32,
    pub poi_seed_file: Option<String>,
}

/// 可选变量，缺失或解析失败时使用默认值
fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.trim_end_matches('h').parse::<u64>().ok())
            .unwrap_or(24);

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: var_or("SERVER_PORT", 8080),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_default(),
            max_search_radius: var_or("MAX_SEARCH_RADIUS", 50_000.0),
            request_timeout_secs: var_or("REQUEST_TIMEOUT_SECS", 10),
            entity_cache_ttl_secs: var_or("ENTITY_CACHE_TTL_SECS", 24 * 3600),
            live_location_ttl_secs: var_or("LIVE_LOCATION_TTL_SECS", 300),
            bcrypt_cost: var_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 10),
            poi_seed_file: env::var("POI_SEED_FILE").ok().filter(|p| !p.is_empty()),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            entity_ttl: Duration::from_secs(self.entity_cache_ttl_secs),
            live_location_ttl: Duration::from_secs(self.live_location_ttl_secs),
        }
    }
}
