//! Row snapshots for the audit stream.
//!
//! Each persisted row type exposes its tracked columns as a flat
//! [`FieldMap`]. Only fields on the model's allow-list are emitted.

use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use orderflow_audit::{AuditModel, FieldMap};
use orderflow_core::Money;

use crate::edit_request::OrderEditRequest;
use crate::order::{Discount, Order, OrderItem, Payment};
use crate::status_change_request::OrderStatusChangeRequest;

pub trait AuditRow {
    const MODEL: AuditModel;

    fn record_id(&self) -> Uuid;

    /// Tracked column → value.
    fn audit_fields(&self) -> FieldMap;
}

fn money(m: Money) -> JsonValue {
    json!(m.minor_units())
}

fn timestamp(at: Option<DateTime<Utc>>) -> JsonValue {
    at.map_or(JsonValue::Null, |t| json!(t.to_rfc3339()))
}

fn text(s: Option<&str>) -> JsonValue {
    s.map_or(JsonValue::Null, |s| json!(s))
}

fn tracked<const N: usize>(model: AuditModel, pairs: [(&str, JsonValue); N]) -> FieldMap {
    pairs
        .into_iter()
        .filter(|(field, _)| model.tracks(field))
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

impl AuditRow for Order {
    const MODEL: AuditModel = AuditModel::Order;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    /// Header row only; children are snapshotted on their own.
    fn audit_fields(&self) -> FieldMap {
        let t = &self.totals;
        tracked(
            Self::MODEL,
            [
                ("status", json!(self.status.as_str())),
                ("apply_tax", json!(self.apply_tax)),
                ("tax_rate", json!(self.tax_rate.to_string())),
                ("subtotal", money(t.subtotal)),
                ("tax", money(t.tax)),
                ("discount_amount", money(t.discount_amount)),
                ("total", money(t.total)),
                ("paid_amount", money(t.paid_amount)),
                ("balance", money(t.balance)),
                ("deleted_at", timestamp(self.deleted_at)),
            ],
        )
    }
}

impl AuditRow for OrderItem {
    const MODEL: AuditModel = AuditModel::OrderItem;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn audit_fields(&self) -> FieldMap {
        tracked(
            Self::MODEL,
            [
                ("description", json!(self.description)),
                ("quantity", json!(self.quantity)),
                ("unit_price", money(self.unit_price)),
                ("line_total", money(self.line_total)),
                ("deleted_at", timestamp(self.deleted_at)),
            ],
        )
    }
}

impl AuditRow for Payment {
    const MODEL: AuditModel = AuditModel::Payment;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn audit_fields(&self) -> FieldMap {
        tracked(
            Self::MODEL,
            [
                ("amount", money(self.amount)),
                ("method", json!(self.method.as_str())),
                ("paid_at", timestamp(Some(self.paid_at))),
            ],
        )
    }
}

impl AuditRow for Discount {
    const MODEL: AuditModel = AuditModel::Discount;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn audit_fields(&self) -> FieldMap {
        tracked(
            Self::MODEL,
            [
                ("amount", money(self.amount)),
                ("reason", json!(self.reason)),
            ],
        )
    }
}

impl AuditRow for OrderEditRequest {
    const MODEL: AuditModel = AuditModel::OrderEditRequest;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn audit_fields(&self) -> FieldMap {
        tracked(
            Self::MODEL,
            [
                ("status", json!(self.status.as_str())),
                ("observations", json!(self.observations)),
                ("review_notes", text(self.review_notes.as_deref())),
                ("expires_at", timestamp(self.expires_at)),
            ],
        )
    }
}

impl AuditRow for OrderStatusChangeRequest {
    const MODEL: AuditModel = AuditModel::OrderStatusChangeRequest;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn audit_fields(&self) -> FieldMap {
        tracked(
            Self::MODEL,
            [
                ("status", json!(self.status.as_str())),
                ("current_status", json!(self.current_status.as_str())),
                ("requested_status", json!(self.requested_status.as_str())),
                ("reason", json!(self.reason)),
                ("review_notes", text(self.review_notes.as_deref())),
            ],
        )
    }
}

/// Every audited row belonging to an order (header, items, payments,
/// discounts), keyed by `(model, record_id)`.
pub fn order_rows(order: &Order) -> Vec<((AuditModel, Uuid), FieldMap)> {
    fn row<R: AuditRow>(r: &R) -> ((AuditModel, Uuid), FieldMap) {
        ((R::MODEL, r.record_id()), r.audit_fields())
    }

    let mut rows = Vec::with_capacity(1 + order.items.len() + order.payments.len() + order.discounts.len());
    rows.push(row(order));
    rows.extend(order.items.iter().map(row));
    rows.extend(order.payments.iter().map(row));
    rows.extend(order.discounts.iter().map(row));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::NewItem;
    use orderflow_core::{OrderId, TaxRate, UserId};

    #[test]
    fn payment_snapshot_is_exactly_the_allow_list() {
        let payment = Payment {
            id: orderflow_core::PaymentId::new(),
            amount: Money::from_minor(500),
            method: crate::order::PaymentMethod::Cash,
            paid_at: Utc::now(),
            received_by: UserId::new(),
        };
        let fields = payment.audit_fields();
        assert!(!fields.contains_key("received_by"));
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        let mut expected = AuditModel::Payment.tracked_fields().to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(fields.get("amount"), Some(&json!(500)));
        assert_eq!(fields.get("method"), Some(&json!("cash")));
    }

    #[test]
    fn order_rows_cover_header_and_children() {
        let mut order = Order::new_draft(OrderId::new(), UserId::new(), false, TaxRate::ZERO, Utc::now());
        let item_id = order
            .add_item(NewItem {
                description: "Wardrobe".into(),
                quantity: 1,
                unit_price: Money::from_minor(70_000),
            })
            .unwrap();

        let rows = order_rows(&order);
        assert_eq!(rows.len(), 2);
        let (key, header) = &rows[0];
        assert_eq!(key.0, AuditModel::Order);
        assert_eq!(header.get("status"), Some(&json!("DRAFT")));
        assert_eq!(header.get("total"), Some(&json!(70_000)));
        assert_eq!(rows[1].0, (AuditModel::OrderItem, *item_id.as_uuid()));
    }
}
