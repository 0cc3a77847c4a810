//! Infrastructure layer: configuration and persistence.

pub mod config;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use store::{InMemoryStore, PgStore, PublicationStore, StoreError, StoreResult, UserStore};
