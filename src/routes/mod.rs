pub mod auth;
pub mod health;
pub mod metrics;
pub mod permissions;
pub mod roles;
pub mod users;
