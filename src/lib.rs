pub mod alerts;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod error_tracker;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod monitor;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod sweeper;
pub mod token_bucket;

pub use config::{Config, MonitorSettings};
pub use error::{Error, Result};
pub use handlers::AppState;
pub use server::{create_app, Server};
