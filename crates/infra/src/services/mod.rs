//! Engine services (application-level orchestration).
//!
//! Every inbound operation runs as one store transaction following the same
//! pipeline:
//!
//! ```text
//! load authoritative rows (never a caller snapshot)
//!   ↓
//! guard (capability, edit lock, state machine, ledger)
//!   ↓
//! mutate the domain objects
//!   ↓
//! save rows + append audit diffs
//!   ↓
//! commit (or discard everything on the first error)
//! ```
//!
//! The engine composes an [`OrderStore`], a [`CapabilityCheck`] and a
//! [`Clock`]; it performs no I/O of its own.

pub mod audit_trail;
pub mod edit_permissions;
pub mod orders;
pub mod status_changes;
pub mod timeline;

use thiserror::Error;

use orderflow_auth::{CapabilityCheck, Principal};
use orderflow_core::{AggregateRoot, Clock, DomainError, ExpectedVersion, OrderId};
use orderflow_orders::Order;

use crate::config::EngineConfig;
use crate::store::{OrderStore, StoreError, UnitOfWork};

pub use audit_trail::AuditTrail;

/// Failure of an engine operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Guard or validation failure; deterministic, never worth retrying as-is.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }

    /// True when the caller should file a status-change request instead.
    pub fn is_escalatable(&self) -> bool {
        self.domain().is_some_and(DomainError::is_escalatable)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// The order lifecycle engine.
///
/// ## Generic Parameters
///
/// - `S`: store implementation (`InMemoryOrderStore` in tests)
/// - `C`: capability check (`RolePolicy`, or any injected fact source)
/// - `K`: clock (`SystemClock`, or `FixedClock` in tests)
#[derive(Debug)]
pub struct OrderEngine<S, C, K> {
    store: S,
    capabilities: C,
    clock: K,
    config: EngineConfig,
}

impl<S, C, K> OrderEngine<S, C, K> {
    pub fn new(store: S, capabilities: C, clock: K) -> Self {
        Self::with_config(store, capabilities, clock, EngineConfig::default())
    }

    pub fn with_config(store: S, capabilities: C, clock: K, config: EngineConfig) -> Self {
        Self {
            store,
            capabilities,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, C, K) {
        (self.store, self.capabilities, self.clock)
    }
}

impl<S, C, K> OrderEngine<S, C, K>
where
    S: OrderStore,
    C: CapabilityCheck,
    K: Clock,
{
    /// Run `f` against the current order inside one transaction, then save
    /// it and append the audit diff of everything `f` changed on it.
    ///
    /// `f` also receives the unit of work so it can consult other rows
    /// (edit grants) before deciding.
    fn mutate_order<T, F>(&self, actor: &Principal, order_id: OrderId, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut Order, &dyn UnitOfWork) -> Result<T, EngineError>,
    {
        let now = self.clock.now();
        self.store.transaction(|uow| {
            let before = load_order(&*uow, order_id)?;
            let mut order = before.clone();

            let out = f(&mut order, &*uow)?;

            let mut trail = AuditTrail::by(actor, now);
            trail.order(Some(&before), &order);
            if !trail.is_empty() {
                uow.save_order(order, ExpectedVersion::Exact(before.version()))?;
                trail.commit(uow)?;
            }
            Ok(out)
        })
    }

    /// The edit lock: a non-DRAFT order is writable only by admins and by
    /// holders of an active edit grant.
    fn ensure_can_edit(&self, uow: &dyn UnitOfWork, actor: &Principal, order: &Order) -> EngineResult<()> {
        if order.is_draft() || self.capabilities.is_admin(actor) {
            return Ok(());
        }

        if edit_permissions::find_active_grant(uow, order.order_id(), actor.id, self.clock.now())?.is_some() {
            return Ok(());
        }

        tracing::warn!(order_id = %order.order_id(), actor = %actor.id, status = %order.status(), "edit refused: order is locked");
        Err(DomainError::EditLocked(order.order_id().to_string()).into())
    }
}

pub(crate) fn load_order(uow: &dyn UnitOfWork, order_id: OrderId) -> EngineResult<Order> {
    uow.load_order(order_id)?
        .ok_or_else(|| DomainError::not_found(format!("order {order_id}")).into())
}
