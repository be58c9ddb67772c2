use thiserror::Error;

use orderflow_audit::AuditLogEntry;
use orderflow_core::{EditRequestId, ExpectedVersion, OrderId, StatusChangeRequestId, UserId};
use orderflow_orders::{Order, OrderEditRequest, OrderStatusChangeRequest};
use std::sync::Arc;

/// Store operation error.
///
/// These are **infrastructure errors** (locking, concurrency, missing rows on
/// update) as opposed to domain errors (validation, guards).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("store lock poisoned")]
    Poisoned,

    /// An update targeted a row that was never inserted.
    #[error("missing row: {0}")]
    MissingRow(String),
}

/// Row-level operations available inside one transaction.
///
/// All reads observe the writes already made through the same unit of work.
/// Nothing becomes visible outside it until the enclosing
/// [`OrderStore::transaction`] commits.
pub trait UnitOfWork {
    /// Load an order aggregate (header plus items, payments and discounts).
    fn load_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Insert or replace an order aggregate.
    ///
    /// Implementations must:
    /// - check `expected` against the stored version (absent rows are version 0)
    /// - advance the saved order's version by one
    fn save_order(&mut self, order: Order, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn edit_request(&self, id: EditRequestId) -> Result<Option<OrderEditRequest>, StoreError>;

    /// Requests for `order_id`, optionally narrowed to one requester, oldest first.
    fn edit_requests_for(
        &self,
        order_id: OrderId,
        requested_by: Option<UserId>,
    ) -> Result<Vec<OrderEditRequest>, StoreError>;

    fn insert_edit_request(&mut self, request: OrderEditRequest) -> Result<(), StoreError>;

    /// Update an existing request; `MissingRow` if it was never inserted.
    fn save_edit_request(&mut self, request: OrderEditRequest) -> Result<(), StoreError>;

    fn status_change_request(
        &self,
        id: StatusChangeRequestId,
    ) -> Result<Option<OrderStatusChangeRequest>, StoreError>;

    /// Requests across all orders, or for one order, oldest first.
    fn status_change_requests(
        &self,
        order_id: Option<OrderId>,
    ) -> Result<Vec<OrderStatusChangeRequest>, StoreError>;

    fn insert_status_change_request(
        &mut self,
        request: OrderStatusChangeRequest,
    ) -> Result<(), StoreError>;

    fn save_status_change_request(
        &mut self,
        request: OrderStatusChangeRequest,
    ) -> Result<(), StoreError>;

    /// Append audit rows. The audit stream is append-only.
    fn append_audit(&mut self, entries: Vec<AuditLogEntry>) -> Result<(), StoreError>;

    /// The full audit stream of one order, in insertion order.
    fn audit_log(&self, order_id: OrderId) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// Transactional store boundary for the order engine.
///
/// ## Transaction semantics
///
/// `transaction(f)` hands `f` a [`UnitOfWork`]:
/// - `Ok` from `f` commits every write made through it, atomically
/// - `Err` from `f` discards every write; the store is left untouched
///
/// Transactions on the same store are isolated from each other, so a guard
/// checked inside `f` (status still matches, no active grant yet) still holds
/// when `f`'s writes commit.
///
/// `read(f)` gives a read-only view; it never writes.
pub trait OrderStore: Send + Sync {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>;

    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore,
{
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transaction(f)
    }

    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).read(f)
    }
}
