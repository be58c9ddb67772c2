//! Infrastructure layer: transactional store, engine services, configuration.

pub mod config;
pub mod services;
pub mod store;


pub use config::{ConfigError, EngineConfig};
pub use services::{AuditTrail, EngineError, EngineResult, OrderEngine};
pub use store::{InMemoryOrderStore, OrderStore, StoreError, UnitOfWork};
