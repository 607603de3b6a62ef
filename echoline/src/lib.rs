pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod responder;

pub use api::{ApiServer, ApiServerConfig};
pub use config::{AppConfig, CacheBackend, DurableBackend};
pub use error::ChatError;
pub use history::{Exchange, HistoryConfig, HistoryManager};
pub use responder::{EchoResponder, Responder, ResponderError};
