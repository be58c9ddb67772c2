//! Transactional store boundary.
//!
//! This module defines the infrastructure-facing abstraction the engine
//! persists orders, requests and audit rows through, without making any
//! storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use r#trait::{OrderStore, StoreError, UnitOfWork};
