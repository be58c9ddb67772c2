//! `orderflow-auth`: capability boundary for the order engine.
//!
//! Authentication and the role/permission subsystem live outside the engine.
//! This crate only models the authenticated actor and the injected
//! "actor has capability X" check the engine consumes.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CapabilityCheck, RolePolicy, authorize, require};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
