use chrono::{DateTime, Utc};

use orderflow_auth::{CapabilityCheck, Permission, Principal, require};
use orderflow_core::{Clock, DomainError, EditRequestId, OrderId, UserId};
use orderflow_orders::OrderEditRequest;

use super::{AuditTrail, EngineResult, OrderEngine, load_order};
use crate::store::{OrderStore, UnitOfWork};

/// Pure read behind every edit-lock decision: the first APPROVED request of
/// `user` on `order_id` whose deadline is still ahead of `now`.
pub(crate) fn find_active_grant(
    uow: &dyn UnitOfWork,
    order_id: OrderId,
    user: UserId,
    now: DateTime<Utc>,
) -> EngineResult<Option<OrderEditRequest>> {
    Ok(uow
        .edit_requests_for(order_id, Some(user))?
        .into_iter()
        .find(|r| r.is_active_grant(now)))
}

fn load_edit_request(uow: &dyn UnitOfWork, id: EditRequestId) -> EngineResult<OrderEditRequest> {
    uow.edit_request(id)?
        .ok_or_else(|| DomainError::not_found(format!("edit request {id}")).into())
}

impl<S, C, K> OrderEngine<S, C, K>
where
    S: OrderStore,
    C: CapabilityCheck,
    K: Clock,
{
    /// File an edit request for a locked order.
    ///
    /// The one-active-request-per-requester check runs inside the inserting
    /// transaction.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id))]
    pub fn request_edit(
        &self,
        actor: &Principal,
        order_id: OrderId,
        observations: &str,
    ) -> EngineResult<OrderEditRequest> {
        let now = self.clock.now();
        let min_chars = self.config.min_observation_chars;

        let request: EngineResult<OrderEditRequest> = self.store.transaction(|uow| {
            let order = load_order(&*uow, order_id)?;
            order.ensure_active()?;

            if self.capabilities.is_admin(actor) {
                return Err(DomainError::not_applicable(
                    "administrators can edit any order without a grant",
                )
                .into());
            }
            if order.is_draft() {
                return Err(DomainError::not_applicable("DRAFT orders are editable without a grant").into());
            }

            let blocking = uow
                .edit_requests_for(order_id, Some(actor.id))?
                .into_iter()
                .find(|r| r.blocks_new_request(now));
            if let Some(existing) = blocking {
                return Err(DomainError::conflict(format!(
                    "edit request {} is already {} for this order",
                    existing.id,
                    existing.effective_status(now)
                ))
                .into());
            }

            let request = OrderEditRequest::new(order_id, actor.id, observations, min_chars, now)?;
            let mut trail = AuditTrail::by(actor, now);
            trail.row(order_id, None, Some(&request));
            uow.insert_edit_request(request.clone())?;
            trail.commit(uow)?;
            Ok(request)
        });

        match &request {
            Ok(r) => tracing::info!(request_id = %r.id, "edit request filed"),
            Err(err) => tracing::warn!(error = %err, "edit request refused"),
        }
        request
    }

    #[tracing::instrument(skip_all, fields(request_id = %request_id, reviewer = %reviewer.id))]
    pub fn approve_edit_request(
        &self,
        reviewer: &Principal,
        request_id: EditRequestId,
        review_notes: Option<String>,
    ) -> EngineResult<OrderEditRequest> {
        require(&self.capabilities, reviewer, &Permission::ADMIN)?;
        let now = self.clock.now();
        let ttl = self.config.edit_grant_ttl();

        let approved = self.store.transaction(|uow| -> EngineResult<_> {
            let before = load_edit_request(&*uow, request_id)?;
            let mut request = before.clone();
            request.approve(reviewer.id, review_notes, ttl, now)?;

            let mut trail = AuditTrail::by(reviewer, now);
            trail.row(request.order_id, Some(&before), Some(&request));
            uow.save_edit_request(request.clone())?;
            trail.commit(uow)?;
            Ok(request)
        })?;

        tracing::info!(order_id = %approved.order_id, expires_at = ?approved.expires_at, "edit request approved");
        Ok(approved)
    }

    #[tracing::instrument(skip_all, fields(request_id = %request_id, reviewer = %reviewer.id))]
    pub fn reject_edit_request(
        &self,
        reviewer: &Principal,
        request_id: EditRequestId,
        review_notes: &str,
    ) -> EngineResult<OrderEditRequest> {
        require(&self.capabilities, reviewer, &Permission::ADMIN)?;
        let now = self.clock.now();

        let rejected = self.store.transaction(|uow| -> EngineResult<_> {
            let before = load_edit_request(&*uow, request_id)?;
            let mut request = before.clone();
            request.reject(reviewer.id, review_notes, now)?;

            let mut trail = AuditTrail::by(reviewer, now);
            trail.row(request.order_id, Some(&before), Some(&request));
            uow.save_edit_request(request.clone())?;
            trail.commit(uow)?;
            Ok(request)
        })?;

        tracing::info!(order_id = %rejected.order_id, "edit request rejected");
        Ok(rejected)
    }

    /// The active grant of `user` on `order_id`, if any.
    ///
    /// This is the single read path the edit lock consults. Grants past their
    /// deadline are never returned; as a side effect their rows are flipped
    /// to EXPIRED.
    pub fn active_grant(&self, order_id: OrderId, user: UserId) -> EngineResult<Option<OrderEditRequest>> {
        let now = self.clock.now();
        self.store.transaction(|uow| {
            let mut trail = AuditTrail::system(now);
            for mut request in uow.edit_requests_for(order_id, Some(user))? {
                let before = request.clone();
                if request.expire_if_due(now) {
                    tracing::debug!(request_id = %request.id, order_id = %order_id, "edit grant expired");
                    trail.row(order_id, Some(&before), Some(&request));
                    uow.save_edit_request(request)?;
                }
            }
            trail.commit(uow)?;

            find_active_grant(&*uow, order_id, user, now)
        })
    }

    /// Every edit request of an order, oldest first, with lazy expiry
    /// applied to the reported status. Read-only.
    pub fn list_edit_requests(&self, order_id: OrderId) -> EngineResult<Vec<OrderEditRequest>> {
        let now = self.clock.now();
        self.store.read(|uow| {
            load_order(uow, order_id)?;
            let mut requests = uow.edit_requests_for(order_id, None)?;
            for request in &mut requests {
                request.status = request.effective_status(now);
            }
            Ok(requests)
        })
    }
}
