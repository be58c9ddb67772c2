use std::collections::HashMap;
use std::sync::Mutex;

use orderflow_audit::AuditLogEntry;
use orderflow_core::{
    AggregateRoot, EditRequestId, ExpectedVersion, OrderId, StatusChangeRequestId, UserId,
};
use orderflow_orders::{Order, OrderEditRequest, OrderStatusChangeRequest};

use super::r#trait::{OrderStore, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    edit_requests: HashMap<EditRequestId, OrderEditRequest>,
    status_change_requests: HashMap<StatusChangeRequestId, OrderStatusChangeRequest>,
    audit: Vec<AuditLogEntry>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Transactions are serialised behind one mutex and
/// run against a copy of the tables, which replaces the live tables only when
/// the closure returns `Ok`. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<Tables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut live = self.tables.lock().map_err(|_| StoreError::Poisoned)?;

        let mut work = live.clone();
        let out = f(&mut work)?;
        *live = work;
        Ok(out)
    }

    fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let live = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        f(&*live)
    }
}

impl UnitOfWork for Tables {
    fn load_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&order_id).cloned())
    }

    fn save_order(&mut self, mut order: Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let current = self.orders.get(order.id()).map(|o| o.version()).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "order {} (expected: {expected:?}, actual: {current})",
                order.id()
            )));
        }

        order.advance_version();
        self.orders.insert(*order.id(), order);
        Ok(())
    }

    fn edit_request(&self, id: EditRequestId) -> Result<Option<OrderEditRequest>, StoreError> {
        Ok(self.edit_requests.get(&id).cloned())
    }

    fn edit_requests_for(
        &self,
        order_id: OrderId,
        requested_by: Option<UserId>,
    ) -> Result<Vec<OrderEditRequest>, StoreError> {
        let mut out: Vec<OrderEditRequest> = self
            .edit_requests
            .values()
            .filter(|r| r.order_id == order_id)
            .filter(|r| requested_by.is_none_or(|user| r.requested_by == user))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }

    fn insert_edit_request(&mut self, request: OrderEditRequest) -> Result<(), StoreError> {
        self.edit_requests.insert(request.id, request);
        Ok(())
    }

    fn save_edit_request(&mut self, request: OrderEditRequest) -> Result<(), StoreError> {
        match self.edit_requests.get_mut(&request.id) {
            Some(row) => {
                *row = request;
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!("edit request {}", request.id))),
        }
    }

    fn status_change_request(
        &self,
        id: StatusChangeRequestId,
    ) -> Result<Option<OrderStatusChangeRequest>, StoreError> {
        Ok(self.status_change_requests.get(&id).cloned())
    }

    fn status_change_requests(
        &self,
        order_id: Option<OrderId>,
    ) -> Result<Vec<OrderStatusChangeRequest>, StoreError> {
        let mut out: Vec<OrderStatusChangeRequest> = self
            .status_change_requests
            .values()
            .filter(|r| order_id.is_none_or(|id| r.order_id == id))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }

    fn insert_status_change_request(
        &mut self,
        request: OrderStatusChangeRequest,
    ) -> Result<(), StoreError> {
        self.status_change_requests.insert(request.id, request);
        Ok(())
    }

    fn save_status_change_request(
        &mut self,
        request: OrderStatusChangeRequest,
    ) -> Result<(), StoreError> {
        match self.status_change_requests.get_mut(&request.id) {
            Some(row) => {
                *row = request;
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!(
                "status change request {}",
                request.id
            ))),
        }
    }

    fn append_audit(&mut self, entries: Vec<AuditLogEntry>) -> Result<(), StoreError> {
        self.audit.extend(entries);
        Ok(())
    }

    fn audit_log(&self, order_id: OrderId) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(self
            .audit
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}
