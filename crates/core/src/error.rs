//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// One variant per failure kind the order engine can report. Every guard
/// failure surfaces as one of these; callers never get a bare `false`.
/// Infrastructure concerns (storage, locking) belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (missing reason, non-positive amount, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not valid for the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation would violate an invariant against existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Absolute financial guard: the order still owes money.
    #[error(
        "cannot move order to {target} while balance is {balance}; \
         use DELIVERED_ON_CREDIT or settle the outstanding payments first"
    )]
    BalanceNotCleared { balance: i64, target: String },

    /// Privilege guard: the transition must go through an approvable request.
    #[error("transition {from} -> {to} requires authorization")]
    RequiresAuthorization { from: String, to: String },

    /// The order drifted since the request was filed.
    #[error("stale request: order was {expected} when filed but is now {actual}")]
    StaleRequest { expected: String, actual: String },

    /// Referenced entity does not exist or does not belong to the stated parent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    /// The workflow does not apply to this actor/entity combination.
    #[error("not applicable: {0}")]
    NotApplicable(String),

    /// The order is immutable for this actor; an edit grant is required.
    #[error("order {0} is locked for editing")]
    EditLocked(String),

    /// The actor lacks a required capability.
    #[error("forbidden: missing capability '{0}'")]
    Forbidden(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_discount(msg: impl Into<String>) -> Self {
        Self::InvalidDiscount(msg.into())
    }

    pub fn invalid_payment(msg: impl Into<String>) -> Self {
        Self::InvalidPayment(msg.into())
    }

    pub fn not_applicable(msg: impl Into<String>) -> Self {
        Self::NotApplicable(msg.into())
    }

    pub fn forbidden(capability: impl Into<String>) -> Self {
        Self::Forbidden(capability.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Stable snake_case kind, for transport layers mapping errors to responses.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::Conflict(_) => "conflict",
            DomainError::BalanceNotCleared { .. } => "balance_not_cleared",
            DomainError::RequiresAuthorization { .. } => "requires_authorization",
            DomainError::StaleRequest { .. } => "stale_request",
            DomainError::NotFound(_) => "not_found",
            DomainError::InvalidDiscount(_) => "invalid_discount",
            DomainError::InvalidPayment(_) => "invalid_payment",
            DomainError::NotApplicable(_) => "not_applicable",
            DomainError::EditLocked(_) => "edit_locked",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::InvalidId(_) => "invalid_id",
        }
    }

    /// Whether the caller should escalate into an approvable request
    /// instead of presenting a terminal failure.
    pub fn is_escalatable(&self) -> bool {
        matches!(self, DomainError::RequiresAuthorization { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_requires_authorization_is_escalatable() {
        let escalate = DomainError::RequiresAuthorization {
            from: "CONFIRMED".to_string(),
            to: "CANCELLED".to_string(),
        };
        assert!(escalate.is_escalatable());
        assert_eq!(escalate.code(), "requires_authorization");

        let balance = DomainError::BalanceNotCleared {
            balance: 8_000_000,
            target: "PAID".to_string(),
        };
        assert!(!balance.is_escalatable());
        assert!(!DomainError::conflict("dup").is_escalatable());
    }

    #[test]
    fn balance_error_names_both_alternatives() {
        let err = DomainError::BalanceNotCleared {
            balance: 500,
            target: "DELIVERED".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DELIVERED_ON_CREDIT"));
        assert!(msg.contains("settle"));
    }
}
