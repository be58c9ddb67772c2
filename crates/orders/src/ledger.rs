//! Order ledger: monetary fields derived from items, discounts and payments.
//!
//! Every operation re-derives the full snapshot from the authoritative child
//! lists instead of patching the previous totals, so a partially applied
//! mutation can never leave drift behind:
//!
//! ```text
//! subtotal = Σ quantity × unit_price   (non-deleted items)
//! tax      = apply_tax ? subtotal × tax_rate : 0
//! total    = subtotal + tax − Σ discounts
//! balance  = total − Σ payments        (negative = credit)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{DiscountId, DomainError, DomainResult, Money, PaymentId, TaxRate, UserId};

use crate::order::{Discount, Order, OrderItem, Payment, PaymentMethod};

/// Minimum length of a discount reason, in characters.
pub const MIN_DISCOUNT_REASON_CHARS: usize = 5;

/// Monetary snapshot of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount_amount: Money,
    pub total: Money,
    pub paid_amount: Money,
    pub balance: Money,
}

impl Totals {
    /// Derive the snapshot from scratch.
    pub fn derive(
        items: &[OrderItem],
        discounts: &[Discount],
        payments: &[Payment],
        apply_tax: bool,
        tax_rate: TaxRate,
    ) -> DomainResult<Self> {
        let mut subtotal = Money::ZERO;
        for item in items.iter().filter(|i| !i.is_deleted()) {
            subtotal = subtotal.checked_add(item.unit_price.times(item.quantity)?)?;
        }

        let tax = if apply_tax {
            tax_rate.apply(subtotal)
        } else {
            Money::ZERO
        };
        let discount_amount = Money::try_sum(discounts.iter().map(|d| d.amount))?;
        let paid_amount = Money::try_sum(payments.iter().map(|p| p.amount))?;
        let total = subtotal.checked_add(tax)?.checked_sub(discount_amount)?;

        Ok(Self {
            subtotal,
            tax,
            discount_amount,
            total,
            paid_amount,
            balance: total.checked_sub(paid_amount)?,
        })
    }

    /// How much more discount the order can absorb before its total hits zero.
    ///
    /// Equal to `total`: subtotal plus tax minus the discounts already taken.
    pub fn discount_headroom(&self) -> Money {
        self.total
    }
}

/// Re-derive `order`'s totals (and line totals) from its child rows.
pub fn recompute(order: &mut Order) -> DomainResult<()> {
    for item in order.items.iter_mut() {
        item.line_total = item.unit_price.times(item.quantity)?;
    }
    order.totals = Totals::derive(
        &order.items,
        &order.discounts,
        &order.payments,
        order.apply_tax,
        order.tax_rate,
    )?;
    Ok(())
}

/// Apply `change` to a copy and keep it only if the totals still derive.
fn commit_with(order: &mut Order, change: impl FnOnce(&mut Order)) -> DomainResult<()> {
    let mut candidate = order.clone();
    change(&mut candidate);
    recompute(&mut candidate)?;
    *order = candidate;
    Ok(())
}

/// Append a discount.
///
/// The caller is responsible for checking the `apply_discounts` capability
/// before calling this.
pub fn apply_discount(
    order: &mut Order,
    amount: Money,
    reason: &str,
    applied_by: UserId,
    applied_at: DateTime<Utc>,
    min_reason_chars: usize,
) -> DomainResult<DiscountId> {
    order.ensure_active()?;
    recompute(order)?;

    if !amount.is_positive() {
        return Err(DomainError::invalid_discount("amount must be positive"));
    }
    let reason = reason.trim();
    if reason.chars().count() < min_reason_chars {
        return Err(DomainError::invalid_discount(format!(
            "reason must be at least {min_reason_chars} characters"
        )));
    }
    let headroom = order.totals.discount_headroom();
    if amount > headroom {
        return Err(DomainError::invalid_discount(format!(
            "amount {amount} exceeds the remaining discountable total {headroom}"
        )));
    }

    let discount = Discount {
        id: DiscountId::new(),
        amount,
        reason: reason.to_string(),
        applied_by,
        applied_at,
    };
    let id = discount.id;
    commit_with(order, |candidate| candidate.discounts.push(discount))?;
    Ok(id)
}

/// Remove a discount.
///
/// Requires a stronger capability than applying one (`delete_discounts`);
/// the caller checks it.
pub fn remove_discount(order: &mut Order, discount_id: DiscountId) -> DomainResult<Discount> {
    order.ensure_active()?;

    let pos = order
        .discounts
        .iter()
        .position(|d| d.id == discount_id)
        .ok_or_else(|| {
            DomainError::not_found(format!("discount {discount_id} on order {}", order.id))
        })?;
    let removed = order.discounts.remove(pos);
    recompute(order)?;
    Ok(removed)
}

/// Record a payment. Overpayment is accepted; the balance goes negative.
pub fn record_payment(
    order: &mut Order,
    amount: Money,
    method: PaymentMethod,
    received_by: UserId,
    paid_at: DateTime<Utc>,
) -> DomainResult<PaymentId> {
    order.ensure_active()?;

    if !amount.is_positive() {
        return Err(DomainError::invalid_payment("amount must be positive"));
    }
    if !order.status.accepts_payments() {
        return Err(DomainError::invalid_payment(format!(
            "payments cannot be recorded while the order is {}",
            order.status
        )));
    }

    let payment = Payment {
        id: PaymentId::new(),
        amount,
        method,
        paid_at,
        received_by,
    };
    let id = payment.id;
    commit_with(order, |candidate| candidate.payments.push(payment))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::NewItem;
    use crate::status::OrderStatus;
    use orderflow_core::OrderId;
    use proptest::prelude::*;

    fn test_user() -> UserId {
        UserId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn item(description: &str, quantity: i64, unit_price: i64) -> NewItem {
        NewItem {
            description: description.to_string(),
            quantity,
            unit_price: Money::from_minor(unit_price),
        }
    }

    /// Confirmed order with a single line worth `subtotal`, no tax.
    fn confirmed_order(subtotal: i64) -> Order {
        let mut order = Order::new_draft(OrderId::new(), test_user(), false, TaxRate::ZERO, test_time());
        order.add_item(item("Cabinet", 1, subtotal)).unwrap();
        order.force_status(OrderStatus::Confirmed);
        order
    }

    fn assert_consistent(order: &Order) {
        let t = order.totals();
        assert_eq!(
            t.total.minor_units(),
            t.subtotal.minor_units() + t.tax.minor_units() - t.discount_amount.minor_units()
        );
        assert_eq!(t.balance.minor_units(), t.total.minor_units() - t.paid_amount.minor_units());
        let discounts = Money::try_sum(order.discounts().iter().map(|d| d.amount)).unwrap();
        let payments = Money::try_sum(order.payments().iter().map(|p| p.amount)).unwrap();
        assert_eq!(t.discount_amount, discounts);
        assert_eq!(t.paid_amount, payments);
    }

    #[test]
    fn discount_then_full_payment_clears_balance() {
        let mut order = confirmed_order(100_000);
        apply_discount(
            &mut order,
            Money::from_minor(20_000),
            "approved by manager",
            test_user(),
            test_time(),
            MIN_DISCOUNT_REASON_CHARS,
        )
        .unwrap();
        assert_eq!(order.totals().total, Money::from_minor(80_000));
        assert_eq!(order.totals().balance, Money::from_minor(80_000));

        record_payment(
            &mut order,
            Money::from_minor(80_000),
            PaymentMethod::Transfer,
            test_user(),
            test_time(),
        )
        .unwrap();
        assert_eq!(order.totals().balance, Money::ZERO);
        assert_consistent(&order);
    }

    #[test]
    fn discount_may_consume_exactly_the_remaining_total() {
        let mut order = confirmed_order(1_000);
        apply_discount(&mut order, Money::from_minor(400), "loyal client", test_user(), test_time(), 5)
            .unwrap();

        let mut too_much = order.clone();
        let err = apply_discount(&mut too_much, Money::from_minor(601), "loyal client", test_user(), test_time(), 5)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidDiscount(_)));

        apply_discount(&mut order, Money::from_minor(600), "loyal client", test_user(), test_time(), 5)
            .unwrap();
        assert_eq!(order.totals().total, Money::ZERO);
    }

    #[test]
    fn discount_headroom_includes_tax() {
        let mut order = Order::new_draft(
            OrderId::new(),
            test_user(),
            true,
            TaxRate::from_basis_points(1_000).unwrap(),
            test_time(),
        );
        order.add_item(item("Desk", 2, 500)).unwrap();
        assert_eq!(order.totals().tax, Money::from_minor(100));
        apply_discount(&mut order, Money::from_minor(1_100), "full comp", test_user(), test_time(), 5)
            .unwrap();
        assert_eq!(order.totals().total, Money::ZERO);
    }

    #[test]
    fn invalid_discounts_are_rejected() {
        let mut order = confirmed_order(1_000);
        for (amount, reason) in [(0, "valid reason"), (-5, "valid reason"), (10, "abc"), (10, "    ")] {
            let err = apply_discount(&mut order, Money::from_minor(amount), reason, test_user(), test_time(), 5)
                .unwrap_err();
            match err {
                DomainError::InvalidDiscount(_) => {}
                other => panic!("expected InvalidDiscount, got {other:?}"),
            }
        }
        assert!(order.discounts().is_empty());
    }

    #[test]
    fn removing_unknown_discount_is_not_found() {
        let mut order = confirmed_order(1_000);
        let err = remove_discount(&mut order, DiscountId::new()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn removing_discount_restores_total() {
        let mut order = confirmed_order(1_000);
        let id = apply_discount(&mut order, Money::from_minor(250), "damaged box", test_user(), test_time(), 5)
            .unwrap();
        let removed = remove_discount(&mut order, id).unwrap();
        assert_eq!(removed.amount, Money::from_minor(250));
        assert_eq!(order.totals().total, Money::from_minor(1_000));
        assert_consistent(&order);
    }

    #[test]
    fn payments_only_in_open_fulfilment_statuses() {
        let mut draft = Order::new_draft(OrderId::new(), test_user(), false, TaxRate::ZERO, test_time());
        draft.add_item(item("Chair", 1, 100)).unwrap();
        let err = record_payment(&mut draft, Money::from_minor(50), PaymentMethod::Cash, test_user(), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayment(_)));

        let mut order = confirmed_order(100);
        let err = record_payment(&mut order, Money::ZERO, PaymentMethod::Cash, test_user(), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayment(_)));
    }

    #[test]
    fn overpayment_is_recorded_as_credit() {
        let mut order = confirmed_order(1_000);
        record_payment(&mut order, Money::from_minor(1_200), PaymentMethod::Card, test_user(), test_time())
            .unwrap();
        assert_eq!(order.totals().balance, Money::from_minor(-200));
        assert_eq!(order.overpayment(), Some(Money::from_minor(200)));
    }

    #[test]
    fn payment_sum_overflow_is_rejected_and_leaves_order_untouched() {
        let mut order = confirmed_order(1_000);
        let max = Money::from_minor(i64::MAX);
        record_payment(&mut order, max, PaymentMethod::Transfer, test_user(), test_time()).unwrap();
        let before = order.clone();

        let err = record_payment(&mut order, max, PaymentMethod::Transfer, test_user(), test_time())
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(order, before);
        assert_eq!(order.payments().len(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        AddItem(i64, i64),
        RemoveFirstItem,
        Discount(i64),
        RemoveFirstDiscount,
        Pay(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..10, 1i64..10_000).prop_map(|(q, p)| Op::AddItem(q, p)),
            Just(Op::RemoveFirstItem),
            (1i64..50_000).prop_map(Op::Discount),
            Just(Op::RemoveFirstDiscount),
            (1i64..50_000).prop_map(Op::Pay),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of item/discount/payment mutations is
        /// attempted (failed ones included), the snapshot stays consistent and
        /// the total never drops below zero.
        #[test]
        fn totals_stay_consistent(
            tax_bp in 0u32..3_000,
            ops in prop::collection::vec(op_strategy(), 1..30),
        ) {
            let tax = TaxRate::from_basis_points(tax_bp).unwrap();
            let mut order = Order::new_draft(OrderId::new(), test_user(), tax_bp > 0, tax, test_time());
            order.add_item(item("Base", 1, 10_000)).unwrap();
            order.force_status(OrderStatus::Confirmed);

            for op in ops {
                let _ = match op {
                    Op::AddItem(q, p) => order.add_item(item("Line", q, p)).map(|_| ()),
                    Op::RemoveFirstItem => match order.items().iter().find(|i| !i.is_deleted()).map(|i| i.id) {
                        Some(id) => order.remove_item(id, test_time()).map(|_| ()),
                        None => Ok(()),
                    },
                    Op::Discount(a) => apply_discount(&mut order, Money::from_minor(a), "promo code", test_user(), test_time(), 5).map(|_| ()),
                    Op::RemoveFirstDiscount => match order.discounts().first().map(|d| d.id) {
                        Some(id) => remove_discount(&mut order, id).map(|_| ()),
                        None => Ok(()),
                    },
                    Op::Pay(a) => record_payment(&mut order, Money::from_minor(a), PaymentMethod::Cash, test_user(), test_time()).map(|_| ()),
                };

                let t = *order.totals();
                prop_assert_eq!(
                    t.total.minor_units(),
                    t.subtotal.minor_units() + t.tax.minor_units() - t.discount_amount.minor_units()
                );
                prop_assert_eq!(t.balance.minor_units(), t.total.minor_units() - t.paid_amount.minor_units());
                prop_assert!(!t.total.is_negative());
            }
        }
    }
}
