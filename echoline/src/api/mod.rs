//! API module for the echoline HTTP server

pub mod middleware;
pub mod routes;
pub mod server;

pub use routes::AppState;
pub use server::{ApiServer, ApiServerConfig};
