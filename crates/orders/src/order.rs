use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{
    AggregateRoot, DiscountId, DomainError, DomainResult, Entity, Money, OrderId, OrderItemId,
    PaymentId, TaxRate, UserId,
};

use crate::ledger::{self, Totals};
use crate::status::{OrderStatus, Transition, plan_transition};

/// Order line. Soft-deleted lines stay in the list but stop counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub description: String,
    pub quantity: i64,
    /// Price in minor currency units.
    pub unit_price: Money,
    pub line_total: Money,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OrderItem {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Entity for OrderItem {
    type Id = OrderItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Check,
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Check => "check",
            PaymentMethod::Other => "other",
        }
    }
}

impl core::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "transfer" => Ok(PaymentMethod::Transfer),
            "check" => Ok(PaymentMethod::Check),
            "other" => Ok(PaymentMethod::Other),
            other => Err(DomainError::validation(format!(
                "unknown payment method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub received_by: UserId,
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub amount: Money,
    pub reason: String,
    pub applied_by: UserId,
    pub applied_at: DateTime<Utc>,
}

impl Entity for Discount {
    type Id = DiscountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for a new order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Partial update of an order line; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.quantity.is_none() && self.unit_price.is_none()
    }
}

fn validate_line(description: &str, quantity: i64, unit_price: Money) -> DomainResult<()> {
    if description.trim().is_empty() {
        return Err(DomainError::validation("item description cannot be empty"));
    }
    if quantity <= 0 {
        return Err(DomainError::validation("item quantity must be positive"));
    }
    if unit_price.is_negative() {
        return Err(DomainError::validation("item unit price cannot be negative"));
    }
    Ok(())
}

/// Aggregate root: Order.
///
/// Owns its items, payments and discounts. The monetary snapshot in `totals`
/// is only ever written by [`ledger::recompute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub(crate) id: OrderId,
    pub(crate) status: OrderStatus,
    pub(crate) apply_tax: bool,
    pub(crate) tax_rate: TaxRate,
    pub(crate) totals: Totals,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) payments: Vec<Payment>,
    pub(crate) discounts: Vec<Discount>,
    pub(crate) created_by: UserId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) deleted_at: Option<DateTime<Utc>>,
    pub(crate) version: u64,
}

impl Order {
    pub fn new_draft(
        id: OrderId,
        created_by: UserId,
        apply_tax: bool,
        tax_rate: TaxRate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: OrderStatus::Draft,
            apply_tax,
            tax_rate,
            totals: Totals::default(),
            items: Vec::new(),
            payments: Vec::new(),
            discounts: Vec::new(),
            created_by,
            created_at,
            deleted_at: None,
            version: 0,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn apply_tax(&self) -> bool {
        self.apply_tax
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn active_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|i| !i.is_deleted())
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn discounts(&self) -> &[Discount] {
        &self.discounts
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// DRAFT orders are open to every editor; anything later is locked.
    pub fn is_draft(&self) -> bool {
        self.status == OrderStatus::Draft
    }

    /// Credit held for the customer when payments exceed the total.
    pub fn overpayment(&self) -> Option<Money> {
        if self.totals.balance.is_negative() {
            Money::ZERO.checked_sub(self.totals.balance).ok()
        } else {
            None
        }
    }

    /// Called by stores once a save has passed its version check.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::invalid_state(format!(
                "order {} has been deleted",
                self.id
            )));
        }
        Ok(())
    }

    /// Apply `f` to a copy, re-derive totals, and keep the copy only if the
    /// result is still a valid ledger (non-negative total).
    fn mutate_checked<T>(&mut self, f: impl FnOnce(&mut Order) -> DomainResult<T>) -> DomainResult<T> {
        self.ensure_active()?;

        let mut candidate = self.clone();
        let out = f(&mut candidate)?;
        ledger::recompute(&mut candidate)?;
        if candidate.totals.total.is_negative() {
            return Err(DomainError::conflict(format!(
                "change would leave order {} with negative total {}; remove discounts first",
                self.id, candidate.totals.total
            )));
        }

        *self = candidate;
        Ok(out)
    }

    pub fn add_item(&mut self, item: NewItem) -> DomainResult<OrderItemId> {
        validate_line(&item.description, item.quantity, item.unit_price)?;
        let line_total = item.unit_price.times(item.quantity)?;

        self.mutate_checked(|order| {
            let id = OrderItemId::new();
            order.items.push(OrderItem {
                id,
                description: item.description.trim().to_string(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total,
                deleted_at: None,
            });
            Ok(id)
        })
    }

    pub fn update_item(&mut self, item_id: OrderItemId, patch: ItemPatch) -> DomainResult<()> {
        if patch.is_empty() {
            return Err(DomainError::validation("item update carries no changes"));
        }

        self.mutate_checked(|order| {
            let order_id = order.id;
            let item = order
                .items
                .iter_mut()
                .find(|i| i.id == item_id && !i.is_deleted())
                .ok_or_else(|| DomainError::not_found(format!("item {item_id} on order {order_id}")))?;

            let description = patch.description.unwrap_or_else(|| item.description.clone());
            let quantity = patch.quantity.unwrap_or(item.quantity);
            let unit_price = patch.unit_price.unwrap_or(item.unit_price);
            validate_line(&description, quantity, unit_price)?;

            item.description = description.trim().to_string();
            item.quantity = quantity;
            item.unit_price = unit_price;
            Ok(())
        })
    }

    /// Soft delete: the line keeps its row (and its audit history) but no
    /// longer counts towards the subtotal.
    pub fn remove_item(&mut self, item_id: OrderItemId, at: DateTime<Utc>) -> DomainResult<()> {
        self.mutate_checked(|order| {
            let order_id = order.id;
            let item = order
                .items
                .iter_mut()
                .find(|i| i.id == item_id && !i.is_deleted())
                .ok_or_else(|| DomainError::not_found(format!("item {item_id} on order {order_id}")))?;
            item.deleted_at = Some(at);
            Ok(())
        })
    }

    pub fn set_tax(&mut self, apply_tax: bool, tax_rate: TaxRate) -> DomainResult<()> {
        self.mutate_checked(|order| {
            order.apply_tax = apply_tax;
            order.tax_rate = tax_rate;
            Ok(())
        })
    }

    /// Run the state machine against the current balance and, if accepted,
    /// write the new status. `Ok(None)` means the order already had `target`.
    pub fn request_transition(
        &mut self,
        target: OrderStatus,
        privileged: bool,
    ) -> DomainResult<Option<Transition>> {
        self.ensure_active()?;
        ledger::recompute(self)?;

        let plan = plan_transition(self.status, target, self.totals.balance, privileged)?;
        if let Some(transition) = plan {
            self.status = transition.to;
        }
        Ok(plan)
    }

    /// Soft delete the whole order.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        self.deleted_at = Some(at);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
