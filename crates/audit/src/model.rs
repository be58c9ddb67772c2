use serde::{Deserialize, Serialize};

/// Which persisted row type an audit entry describes.
///
/// Each model carries a fixed allow-list of fields that may surface in a
/// timeline; identifiers, foreign keys and bookkeeping columns never do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditModel {
    Order,
    OrderItem,
    Payment,
    Discount,
    OrderEditRequest,
    OrderStatusChangeRequest,
}

const ORDER_FIELDS: &[&str] = &[
    "status",
    "apply_tax",
    "tax_rate",
    "subtotal",
    "tax",
    "discount_amount",
    "total",
    "paid_amount",
    "balance",
    "deleted_at",
];

const ORDER_ITEM_FIELDS: &[&str] = &[
    "description",
    "quantity",
    "unit_price",
    "line_total",
    "deleted_at",
];

const PAYMENT_FIELDS: &[&str] = &["amount", "method", "paid_at"];

const DISCOUNT_FIELDS: &[&str] = &["amount", "reason"];

const EDIT_REQUEST_FIELDS: &[&str] = &["status", "observations", "review_notes", "expires_at"];

const STATUS_CHANGE_REQUEST_FIELDS: &[&str] = &[
    "status",
    "current_status",
    "requested_status",
    "reason",
    "review_notes",
];

impl AuditModel {
    /// Fields that may be reported for this model, in display order.
    pub const fn tracked_fields(self) -> &'static [&'static str] {
        match self {
            AuditModel::Order => ORDER_FIELDS,
            AuditModel::OrderItem => ORDER_ITEM_FIELDS,
            AuditModel::Payment => PAYMENT_FIELDS,
            AuditModel::Discount => DISCOUNT_FIELDS,
            AuditModel::OrderEditRequest => EDIT_REQUEST_FIELDS,
            AuditModel::OrderStatusChangeRequest => STATUS_CHANGE_REQUEST_FIELDS,
        }
    }

    pub fn tracks(self, field: &str) -> bool {
        self.tracked_fields().contains(&field)
    }

    pub fn label(self) -> &'static str {
        match self {
            AuditModel::Order => "Order",
            AuditModel::OrderItem => "Item",
            AuditModel::Payment => "Payment",
            AuditModel::Discount => "Discount",
            AuditModel::OrderEditRequest => "Edit request",
            AuditModel::OrderStatusChangeRequest => "Status change request",
        }
    }

    /// Line-level rows are sub-grouped per record in a timeline event.
    pub fn is_line_item(self) -> bool {
        matches!(self, AuditModel::OrderItem)
    }
}

/// Human label for a tracked column.
pub fn field_label(field: &str) -> &str {
    match field {
        "apply_tax" => "tax applied",
        "tax_rate" => "tax rate",
        "discount_amount" => "discounts",
        "paid_amount" => "paid",
        "deleted_at" => "deleted",
        "unit_price" => "unit price",
        "line_total" => "line total",
        "paid_at" => "paid at",
        "review_notes" => "review notes",
        "expires_at" => "expires",
        "current_status" => "from status",
        "requested_status" => "requested status",
        other => other,
    }
}
