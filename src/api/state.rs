use std::{convert::Infallible, sync::Arc};

use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};
use warp::Filter;

use crate::config::Config;

/// Everything a request handler needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub cache: MultiplexedConnection,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, cache: MultiplexedConnection, config: Config) -> Self {
        Self {
            pool,
            cache,
            config: Arc::new(config),
        }
    }
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
