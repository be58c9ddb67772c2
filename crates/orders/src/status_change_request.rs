//! Status-change authorization workflow.
//!
//! A privilege-guarded transition the actor cannot apply directly is filed as
//! an [`OrderStatusChangeRequest`] and applied on admin approval. The request
//! pins the status the order had when it was filed; approval against a
//! drifted order fails with [`DomainError::StaleRequest`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult, Entity, OrderId, StatusChangeRequestId, UserId};

use crate::status::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusChangeRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl StatusChangeRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusChangeRequestStatus::Pending => "PENDING",
            StatusChangeRequestStatus::Approved => "APPROVED",
            StatusChangeRequestStatus::Rejected => "REJECTED",
        }
    }
}

impl core::fmt::Display for StatusChangeRequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangeRequest {
    pub id: StatusChangeRequestId,
    pub order_id: OrderId,
    pub requested_by: UserId,
    pub current_status: OrderStatus,
    pub requested_status: OrderStatus,
    pub reason: String,
    pub status: StatusChangeRequestStatus,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderStatusChangeRequest {
    /// File a request. The balance guard is deliberately not consulted here;
    /// it runs again at approval time.
    pub fn new(
        order_id: OrderId,
        requested_by: UserId,
        current_status: OrderStatus,
        requested_status: OrderStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if requested_status == current_status {
            return Err(DomainError::validation(format!(
                "order is already {current_status}"
            )));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a reason is required"));
        }

        Ok(Self {
            id: StatusChangeRequestId::new(),
            order_id,
            requested_by,
            current_status,
            requested_status,
            reason: reason.to_string(),
            status: StatusChangeRequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == StatusChangeRequestStatus::Pending
    }

    pub fn ensure_pending(&self) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::invalid_state(format!(
                "status change request {} is {}, not PENDING",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// The order must still be where it was when the request was filed.
    pub fn ensure_fresh(&self, actual: OrderStatus) -> DomainResult<()> {
        if actual != self.current_status {
            return Err(DomainError::StaleRequest {
                expected: self.current_status.as_str().to_string(),
                actual: actual.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Flip to APPROVED. Callers apply the transition in the same unit of work.
    pub fn approve(
        &mut self,
        reviewer: UserId,
        review_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = StatusChangeRequestStatus::Approved;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.review_notes = review_notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        Ok(())
    }

    pub fn reject(&mut self, reviewer: UserId, review_notes: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let notes = review_notes.trim();
        if notes.is_empty() {
            return Err(DomainError::validation("review notes are required to reject a request"));
        }
        self.ensure_pending()?;
        self.status = StatusChangeRequestStatus::Rejected;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.review_notes = Some(notes.to_string());
        Ok(())
    }
}

impl Entity for OrderStatusChangeRequest {
    type Id = StatusChangeRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
