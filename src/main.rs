use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use geopresence::{
    AppState,
    cache::RedisGeoCache,
    config::Config,
    database::PgRecordStore,
    router::create_router,
    seed::bootstrap_pois,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().inspect_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
    })?;

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'geopresence';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .inspect_err(|e| tracing::error!("Failed to connect to Postgres: {}", e))?;

    let store = Arc::new(PgRecordStore::new(pool));
    store
        .migrate()
        .await
        .inspect_err(|e| tracing::error!("Failed to run migrations: {}", e))?;

    // 设置 Redis 客户端，所有请求共享一个多路复用连接
    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let cache = Arc::new(
        RedisGeoCache::connect(&redis_client)
            .await
            .inspect_err(|e| tracing::error!("Failed to connect to Redis: {}", e))?,
    );

    // 设置应用状态
    let state = AppState::new(config.clone(), store.clone(), cache);

    // 导入兴趣点并重建缓存
    let report = bootstrap_pois(
        store.as_ref(),
        &state.presence,
        config.poi_seed_file.as_deref().map(Path::new),
    )
    .await
    .inspect_err(|e| tracing::error!("Failed to bootstrap POIs: {}", e))?;
    tracing::info!("POI cache ready with {} entries", report.seeded);

    let app = create_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
