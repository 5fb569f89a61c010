// Library exports for the API binary, the admin tool and integration tests
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

pub use app::{router, AppState};
