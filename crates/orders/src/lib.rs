//! `orderflow-orders`: the order aggregate and its workflows.
//!
//! Pure domain: the status state machine, the ledger, the edit-permission and
//! status-change request records, and their audit snapshots. No I/O.

pub mod edit_request;
pub mod ledger;
pub mod order;
pub mod snapshot;
pub mod status;
pub mod status_change_request;

pub use edit_request::{
    DEFAULT_EDIT_GRANT_TTL_MINUTES, EditRequestStatus, MIN_OBSERVATION_CHARS, OrderEditRequest,
};
pub use ledger::{MIN_DISCOUNT_REASON_CHARS, Totals};
pub use order::{Discount, ItemPatch, NewItem, Order, OrderItem, Payment, PaymentMethod};
pub use snapshot::{AuditRow, order_rows};
pub use status::{
    OrderStatus, Transition, allowed_targets, check_balance_guard, plan_transition,
    requires_privilege,
};
pub use status_change_request::{OrderStatusChangeRequest, StatusChangeRequestStatus};
