pub mod auth;
pub mod guard;
pub mod metrics;
pub mod password;
pub mod permissions;
pub mod resolver;
pub mod roles;
pub mod tokens;
pub mod users;
pub mod validation;
