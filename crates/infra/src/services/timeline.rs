use orderflow_audit::{AuditLogEntry, TimelineEvent, build_timeline};
use orderflow_auth::CapabilityCheck;
use orderflow_core::{Clock, OrderId};

use super::{EngineResult, OrderEngine, load_order};
use crate::store::OrderStore;

impl<S, C, K> OrderEngine<S, C, K>
where
    S: OrderStore,
    C: CapabilityCheck,
    K: Clock,
{
    /// Raw audit stream of an order, in insertion order.
    pub fn audit_log(&self, order_id: OrderId) -> EngineResult<Vec<AuditLogEntry>> {
        self.store.read(|uow| {
            load_order(uow, order_id)?;
            Ok(uow.audit_log(order_id)?)
        })
    }

    /// Human-readable history of an order, most recent event first.
    ///
    /// Re-derived from the audit stream on every call.
    pub fn build_timeline(&self, order_id: OrderId) -> EngineResult<Vec<TimelineEvent>> {
        let entries = self.audit_log(order_id)?;
        let events = build_timeline(&entries, &self.config.timeline_options());
        tracing::debug!(order_id = %order_id, entries = entries.len(), events = events.len(), "timeline built");
        Ok(events)
    }
}
