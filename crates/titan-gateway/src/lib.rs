pub mod auth;
pub mod cells;
pub mod config;
pub mod error;
pub mod groups;
pub mod http;
pub mod internal;
pub mod presence;
pub mod session_log;
pub mod ws;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::AppState;
