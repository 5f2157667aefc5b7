mod database {
    pub mod actions;
    pub mod composition;
    pub mod error;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod storage {
    pub mod images;
}
mod api {
    pub mod handlers;
    pub mod routes;
    pub mod state;
}
mod config;
mod constants;

pub use api::routes::routes;
pub use api::state::State;
pub use authentication::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use storage::*;
