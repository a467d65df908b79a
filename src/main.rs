use std::{error::Error, net::SocketAddr};

use foodgram::{
    api::{routes::routes, state::AppState},
    cache::cache::CacheLifetime,
    config::Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    log::info!("> Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    log::info!("> Connecting to cache");
    let client = redis::Client::open(config.redis_url.as_str())?;
    let mut cache = client.get_multiplexed_tokio_connection().await?;
    CacheLifetime::BindCatalogCache.rotate(&mut cache).await?;

    tokio::fs::create_dir_all(&config.media_root).await?;

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(pool, cache, config);

    log::info!("> Listening on {address}");
    warp::serve(routes(state)).run(address).await;

    Ok(())
}
