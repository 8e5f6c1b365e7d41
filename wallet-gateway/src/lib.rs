pub mod auth;
pub mod clients;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod sweeper;

pub use config::Config;
pub use errors::{GatewayError, Result};
