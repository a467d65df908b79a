mod database {
    pub mod actions;
    pub mod error;
    pub mod filters;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
pub mod api {
    pub mod handlers;
    pub mod rejection;
    pub mod routes;
    pub mod serializers;
    pub mod state;
}
mod constants;

pub mod cache {
    pub mod cache;
}

pub mod config;
pub mod media;
pub mod report;

pub use authentication::*;
pub use constants::*;
pub use database::*;
