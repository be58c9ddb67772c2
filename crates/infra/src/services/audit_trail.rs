use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use orderflow_audit::{AuditLogEntry, AuditModel, FieldMap};
use orderflow_auth::Principal;
use orderflow_core::{OrderId, UserId};
use orderflow_orders::{AuditRow, Order, order_rows};

use crate::store::{StoreError, UnitOfWork};

/// Collects the audit rows one transaction owes the audit stream.
///
/// Rows are diffed from before/after snapshots, so every mutated row yields
/// exactly one entry and untouched rows yield none. All entries share the
/// transaction's timestamp.
#[derive(Debug)]
pub struct AuditTrail {
    user: Option<UserId>,
    user_name: Option<String>,
    at: DateTime<Utc>,
    entries: Vec<AuditLogEntry>,
}

impl AuditTrail {
    pub fn by(actor: &Principal, at: DateTime<Utc>) -> Self {
        Self {
            user: Some(actor.id),
            user_name: Some(actor.display_name.clone()),
            at,
            entries: Vec::new(),
        }
    }

    /// Writes the engine performs on nobody's behalf (lazy expiry).
    pub fn system(at: DateTime<Utc>) -> Self {
        Self {
            user: None,
            user_name: None,
            at,
            entries: Vec::new(),
        }
    }

    fn push(
        &mut self,
        order_id: OrderId,
        model: AuditModel,
        record_id: Uuid,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
    ) {
        if let Some(mut entry) =
            AuditLogEntry::from_snapshots(order_id, model, record_id, before, after, self.user, self.at)
        {
            entry.user_name = self.user_name.clone();
            self.entries.push(entry);
        }
    }

    /// Diff an order aggregate and all its child rows. `before` is `None` for
    /// a freshly created order.
    pub fn order(&mut self, before: Option<&Order>, after: &Order) {
        let order_id = after.order_id();
        let mut old: BTreeMap<(AuditModel, Uuid), FieldMap> =
            before.map(order_rows).unwrap_or_default().into_iter().collect();

        for (key, fields) in order_rows(after) {
            let prior = old.remove(&key);
            self.push(order_id, key.0, key.1, prior.as_ref(), Some(&fields));
        }
        for ((model, record_id), fields) in old {
            self.push(order_id, model, record_id, Some(&fields), None);
        }
    }

    /// Diff one standalone row (edit or status-change request).
    pub fn row<R: AuditRow>(&mut self, order_id: OrderId, before: Option<&R>, after: Option<&R>) {
        let record_id = match (before, after) {
            (_, Some(r)) | (Some(r), None) => r.record_id(),
            (None, None) => return,
        };
        let old = before.map(R::audit_fields);
        let new = after.map(R::audit_fields);
        self.push(order_id, R::MODEL, record_id, old.as_ref(), new.as_ref());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append everything collected to the audit stream of `uow`.
    pub fn commit(self, uow: &mut dyn UnitOfWork) -> Result<usize, StoreError> {
        let count = self.entries.len();
        if count > 0 {
            uow.append_audit(self.entries)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_audit::AuditAction;
    use orderflow_core::{Money, TaxRate};
    use orderflow_orders::NewItem;

    fn test_actor() -> Principal {
        Principal::new(UserId::new(), "Dana")
    }

    fn test_order() -> Order {
        Order::new_draft(OrderId::new(), UserId::new(), false, TaxRate::ZERO, Utc::now())
    }

    #[test]
    fn new_order_is_a_single_create() {
        let order = test_order();
        let mut trail = AuditTrail::by(&test_actor(), Utc::now());
        trail.order(None, &order);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.entries[0].action, AuditAction::Create);
        assert_eq!(trail.entries[0].user_name.as_deref(), Some("Dana"));
    }

    #[test]
    fn adding_an_item_touches_header_and_item_only() {
        let before = test_order();
        let mut after = before.clone();
        after
            .add_item(NewItem {
                description: "Bench".into(),
                quantity: 2,
                unit_price: Money::from_minor(300),
            })
            .unwrap();

        let mut trail = AuditTrail::by(&test_actor(), Utc::now());
        trail.order(Some(&before), &after);

        let mut models: Vec<(AuditModel, AuditAction)> =
            trail.entries.iter().map(|e| (e.model, e.action)).collect();
        models.sort_by_key(|(m, _)| *m);
        assert_eq!(
            models,
            vec![
                (AuditModel::Order, AuditAction::Update),
                (AuditModel::OrderItem, AuditAction::Create),
            ]
        );
    }

    #[test]
    fn unchanged_order_produces_nothing() {
        let order = test_order();
        let mut trail = AuditTrail::system(Utc::now());
        trail.order(Some(&order), &order);
        assert!(trail.is_empty());
    }
}
