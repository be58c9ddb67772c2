//! Edit permission workflow.
//!
//! An order outside DRAFT is immutable to non-admins. A requester files an
//! [`OrderEditRequest`]; an admin approves it into a time-boxed grant.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED ──(now ≥ expires_at)──▶ EXPIRED
//!    └────reject────▶ REJECTED
//! ```
//!
//! Expiry is never scheduled. [`OrderEditRequest::effective_status`] derives
//! it from `(status, expires_at, now)` on every read, so an APPROVED row past
//! its deadline is inactive whether or not the EXPIRED write ever happened.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult, EditRequestId, Entity, OrderId, UserId};

/// Default lifetime of an approved edit grant.
pub const DEFAULT_EDIT_GRANT_TTL_MINUTES: i64 = 30;

/// Minimum length of the requester's observations, in characters.
pub const MIN_OBSERVATION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditRequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl EditRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EditRequestStatus::Pending => "PENDING",
            EditRequestStatus::Approved => "APPROVED",
            EditRequestStatus::Rejected => "REJECTED",
            EditRequestStatus::Expired => "EXPIRED",
        }
    }
}

impl core::fmt::Display for EditRequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEditRequest {
    pub id: EditRequestId,
    pub order_id: OrderId,
    pub requested_by: UserId,
    pub status: EditRequestStatus,
    pub observations: String,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    /// Set only on approval.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OrderEditRequest {
    pub fn new(
        order_id: OrderId,
        requested_by: UserId,
        observations: &str,
        min_observation_chars: usize,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let observations = observations.trim();
        if observations.chars().count() < min_observation_chars {
            return Err(DomainError::validation(format!(
                "observations must be at least {min_observation_chars} characters"
            )));
        }

        Ok(Self {
            id: EditRequestId::new(),
            order_id,
            requested_by,
            status: EditRequestStatus::Pending,
            observations: observations.to_string(),
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            expires_at: None,
            created_at: now,
        })
    }

    /// Status as of `now`, with lazy expiry applied.
    pub fn effective_status(&self, now: DateTime<Utc>) -> EditRequestStatus {
        match (self.status, self.expires_at) {
            (EditRequestStatus::Approved, Some(expires_at)) if now >= expires_at => {
                EditRequestStatus::Expired
            }
            (status, _) => status,
        }
    }

    pub fn is_active_grant(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == EditRequestStatus::Approved
    }

    /// Whether this request prevents its requester from filing another one
    /// for the same order.
    pub fn blocks_new_request(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.effective_status(now),
            EditRequestStatus::Pending | EditRequestStatus::Approved
        )
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if self.status != EditRequestStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "edit request {} is {}, not PENDING",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn approve(
        &mut self,
        reviewer: UserId,
        review_notes: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_pending()?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| DomainError::validation("grant expiry is out of range"))?;
        self.status = EditRequestStatus::Approved;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.review_notes = review_notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.expires_at = Some(expires_at);
        Ok(())
    }

    pub fn reject(&mut self, reviewer: UserId, review_notes: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let notes = review_notes.trim();
        if notes.is_empty() {
            return Err(DomainError::validation("review notes are required to reject a request"));
        }
        self.ensure_pending()?;
        self.status = EditRequestStatus::Rejected;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.review_notes = Some(notes.to_string());
        Ok(())
    }

    /// Persist the lazy APPROVED→EXPIRED transition. Returns whether the row
    /// changed. Never required for correctness.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == EditRequestStatus::Approved
            && self.effective_status(now) == EditRequestStatus::Expired
        {
            self.status = EditRequestStatus::Expired;
            true
        } else {
            false
        }
    }
}

impl Entity for OrderEditRequest {
    type Id = EditRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn test_ttl() -> Duration {
        Duration::minutes(DEFAULT_EDIT_GRANT_TTL_MINUTES)
    }

    fn test_request() -> OrderEditRequest {
        OrderEditRequest::new(
            OrderId::new(),
            UserId::new(),
            "need to fix typo",
            MIN_OBSERVATION_CHARS,
            test_now(),
        )
        .unwrap()
    }

    #[test]
    fn short_observations_are_rejected() {
        let err = OrderEditRequest::new(OrderId::new(), UserId::new(), " too short ", 10, test_now())
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("expected Validation error"),
        }
    }

    #[test]
    fn approval_with_unrepresentable_expiry_stays_pending() {
        let mut req = test_request();
        let err = req
            .approve(UserId::new(), None, test_ttl(), DateTime::<Utc>::MAX_UTC)
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("expected Validation error"),
        }
        assert_eq!(req.status, EditRequestStatus::Pending);
        assert_eq!(req.expires_at, None);
    }

    #[test]
    fn approval_opens_a_time_boxed_grant() {
        let now = test_now();
        let mut req = test_request();
        assert!(req.blocks_new_request(now));
        assert!(!req.is_active_grant(now));

        req.approve(UserId::new(), None, test_ttl(), now).unwrap();
        assert_eq!(req.expires_at, Some(now + test_ttl()));
        assert!(req.is_active_grant(now + Duration::minutes(29)));

        // Exactly at the deadline the grant is gone.
        assert!(!req.is_active_grant(now + test_ttl()));
        let later = now + test_ttl() + Duration::seconds(1);
        assert_eq!(req.status, EditRequestStatus::Approved);
        assert_eq!(req.effective_status(later), EditRequestStatus::Expired);
        assert!(!req.blocks_new_request(later));
    }

    #[test]
    fn expire_if_due_only_writes_once_past_deadline() {
        let now = test_now();
        let mut req = test_request();
        req.approve(UserId::new(), Some("ok".into()), test_ttl(), now).unwrap();

        assert!(!req.expire_if_due(now + Duration::minutes(5)));
        assert!(req.expire_if_due(now + Duration::minutes(31)));
        assert_eq!(req.status, EditRequestStatus::Expired);
        assert!(!req.expire_if_due(now + Duration::minutes(32)));
    }

    #[test]
    fn reviewed_requests_cannot_be_reviewed_again() {
        let now = test_now();
        let mut req = test_request();
        req.reject(UserId::new(), "not justified", now).unwrap();
        assert_eq!(req.status, EditRequestStatus::Rejected);

        let err = req.approve(UserId::new(), None, test_ttl(), now).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        let err = req.reject(UserId::new(), "again", now).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn rejection_requires_notes() {
        let mut req = test_request();
        let err = req.reject(UserId::new(), "   ", test_now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(req.status, EditRequestStatus::Pending);
    }
}
