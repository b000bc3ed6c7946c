pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;
pub mod validation;

pub use routes::build_router;
pub use state::AppState;
