use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use auth::{
    AppState, AuthConfig, AuthService,
    cookie::RefreshCookie,
    database,
    hasher::Argon2Hasher,
    jwt::TokenIssuer,
    rate_limiter::RateLimiter,
    repositories::{PgSessionRepository, PgUserRepository},
    routes,
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    let config = AuthConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    // Initialize Redis client for rate-limit counters
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    if !redis_pool.health_check().await? {
        anyhow::bail!("Failed to connect to Redis");
    }

    let auth = AuthService::new(
        &config,
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgSessionRepository::new(pool)),
        Arc::new(Argon2Hasher::new(&config.hashing)?),
        TokenIssuer::new(&config.tokens),
    );

    let app_state = AppState {
        auth: auth.clone(),
        rate_limiter: RateLimiter::new(Arc::new(redis_pool), &config.rate_limit),
        cookies: RefreshCookie::new(&config.cookie),
        trust_proxy: config.trust_proxy,
    };

    // Expired sessions are dead weight; lookups already ignore them.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match auth.purge_expired_sessions().await {
                Ok(purged) => info!(purged, "Expired sessions purged"),
                Err(e) => error!("Failed to purge expired sessions: {}", e),
            }
        }
    });

    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Authentication service listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
