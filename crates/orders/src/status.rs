//! Order status state machine.
//!
//! Guards run in a fixed order:
//!
//! 1. same status → no-op
//! 2. balance guard (absolute; no privilege bypasses it)
//! 3. privilege guard (escalatable through a status-change request)
//!
//! Only privilege is escalatable, never arithmetic: an approved request still
//! passes through step 2.

use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    InProduction,
    Ready,
    Delivered,
    DeliveredOnCredit,
    Warranty,
    Returned,
    Paid,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 11] = [
        OrderStatus::Draft,
        OrderStatus::Confirmed,
        OrderStatus::InProduction,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::DeliveredOnCredit,
        OrderStatus::Warranty,
        OrderStatus::Returned,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
        OrderStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InProduction => "IN_PRODUCTION",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::DeliveredOnCredit => "DELIVERED_ON_CREDIT",
            OrderStatus::Warranty => "WARRANTY",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Completed => "COMPLETED",
        }
    }

    /// Position along the fulfilment pipeline; moving to a lower stage is a
    /// backward transition.
    fn stage(self) -> u8 {
        match self {
            OrderStatus::Draft => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::InProduction => 2,
            OrderStatus::Ready => 3,
            OrderStatus::Delivered | OrderStatus::DeliveredOnCredit => 4,
            OrderStatus::Paid => 5,
            OrderStatus::Warranty | OrderStatus::Returned => 6,
            OrderStatus::Completed => 7,
            OrderStatus::Cancelled => 8,
        }
    }

    /// Statuses that may only be entered with a cleared balance.
    pub fn requires_cleared_balance(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Delivered)
    }

    /// Statuses in which payments may be recorded.
    pub fn accepts_payments(self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::InProduction
                | OrderStatus::Ready
                | OrderStatus::Delivered
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// An accepted status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Whether `from → to` needs an elevated actor.
///
/// Fixed set: cancelling anything past DRAFT, reopening a cancelled order,
/// and any move backwards along the pipeline.
pub fn requires_privilege(from: OrderStatus, to: OrderStatus) -> bool {
    if from == to {
        return false;
    }
    if to == OrderStatus::Cancelled {
        return from != OrderStatus::Draft;
    }
    if from == OrderStatus::Cancelled {
        return true;
    }
    to.stage() < from.stage()
}

/// The absolute financial guard.
pub fn check_balance_guard(target: OrderStatus, balance: Money) -> DomainResult<()> {
    if target.requires_cleared_balance() && balance.is_positive() {
        return Err(DomainError::BalanceNotCleared {
            balance: balance.minor_units(),
            target: target.as_str().to_string(),
        });
    }
    Ok(())
}

/// Validate `current → target`. `Ok(None)` is the same-status no-op.
pub fn plan_transition(
    current: OrderStatus,
    target: OrderStatus,
    balance: Money,
    privileged: bool,
) -> DomainResult<Option<Transition>> {
    if current == target {
        return Ok(None);
    }

    check_balance_guard(target, balance)?;

    if requires_privilege(current, target) && !privileged {
        return Err(DomainError::RequiresAuthorization {
            from: current.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }

    Ok(Some(Transition {
        from: current,
        to: target,
    }))
}

/// Statuses the engine would accept from `current` for this actor, ignoring
/// the balance guard. Intended for deciding what to offer, not for enforcing.
pub fn allowed_targets(current: OrderStatus, privileged: bool) -> Vec<OrderStatus> {
    OrderStatus::ALL
        .into_iter()
        .filter(|target| *target != current)
        .filter(|target| privileged || !requires_privilege(current, *target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_status_is_a_noop_even_with_open_balance() {
        let plan = plan_transition(
            OrderStatus::Paid,
            OrderStatus::Paid,
            Money::from_minor(10),
            false,
        )
        .unwrap();
        assert_eq!(plan, None);
    }

    #[test]
    fn paid_and_delivered_require_cleared_balance_even_for_admins() {
        for target in [OrderStatus::Paid, OrderStatus::Delivered] {
            let err = plan_transition(OrderStatus::Ready, target, Money::from_minor(1), true)
                .unwrap_err();
            match err {
                DomainError::BalanceNotCleared { balance, target: t } => {
                    assert_eq!(balance, 1);
                    assert_eq!(t, target.as_str());
                }
                other => panic!("expected balance guard, got {other:?}"),
            }
        }
    }

    #[test]
    fn delivered_on_credit_is_the_open_balance_alternative() {
        let plan = plan_transition(
            OrderStatus::Ready,
            OrderStatus::DeliveredOnCredit,
            Money::from_minor(80_000),
            false,
        )
        .unwrap();
        assert_eq!(
            plan,
            Some(Transition {
                from: OrderStatus::Ready,
                to: OrderStatus::DeliveredOnCredit
            })
        );
    }

    #[test]
    fn overpaid_order_passes_the_balance_guard() {
        assert!(check_balance_guard(OrderStatus::Paid, Money::from_minor(-500)).is_ok());
    }

    #[test]
    fn balance_guard_runs_before_privilege_guard() {
        // Backward (privileged) and balance-gated at once: the absolute guard wins.
        let err = plan_transition(
            OrderStatus::Completed,
            OrderStatus::Delivered,
            Money::from_minor(100),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::BalanceNotCleared { .. }));
    }

    #[test]
    fn cancelling_after_confirmation_requires_privilege() {
        assert!(!requires_privilege(OrderStatus::Draft, OrderStatus::Cancelled));
        for from in [
            OrderStatus::Confirmed,
            OrderStatus::InProduction,
            OrderStatus::Paid,
        ] {
            assert!(requires_privilege(from, OrderStatus::Cancelled));
        }

        let err = plan_transition(
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            Money::ZERO,
            false,
        )
        .unwrap_err();
        assert!(err.is_escalatable());
    }

    #[test]
    fn backward_moves_and_reopening_require_privilege() {
        assert!(requires_privilege(OrderStatus::Ready, OrderStatus::Confirmed));
        assert!(requires_privilege(OrderStatus::Cancelled, OrderStatus::Draft));
        assert!(requires_privilege(OrderStatus::Paid, OrderStatus::DeliveredOnCredit));
        assert!(!requires_privilege(OrderStatus::Confirmed, OrderStatus::Ready));
        assert!(!requires_privilege(OrderStatus::Delivered, OrderStatus::DeliveredOnCredit));
        assert!(!requires_privilege(OrderStatus::Paid, OrderStatus::Warranty));
    }

    #[test]
    fn allowed_targets_hide_privileged_moves_from_regular_users() {
        let regular = allowed_targets(OrderStatus::Confirmed, false);
        assert!(!regular.contains(&OrderStatus::Cancelled));
        assert!(!regular.contains(&OrderStatus::Draft));
        assert!(regular.contains(&OrderStatus::InProduction));

        let admin = allowed_targets(OrderStatus::Confirmed, true);
        assert_eq!(admin.len(), OrderStatus::ALL.len() - 1);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(
            "delivered_on_credit".parse::<OrderStatus>().unwrap(),
            OrderStatus::DeliveredOnCredit
        );
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }
}
