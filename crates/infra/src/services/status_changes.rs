use orderflow_auth::{CapabilityCheck, Permission, Principal, require};
use orderflow_core::{AggregateRoot, Clock, DomainError, ExpectedVersion, OrderId, StatusChangeRequestId};
use orderflow_orders::{OrderStatus, OrderStatusChangeRequest, Transition};

use super::{AuditTrail, EngineResult, OrderEngine, load_order};
use crate::store::{OrderStore, UnitOfWork};

fn load_status_change_request(
    uow: &dyn UnitOfWork,
    id: StatusChangeRequestId,
) -> EngineResult<OrderStatusChangeRequest> {
    uow.status_change_request(id)?
        .ok_or_else(|| DomainError::not_found(format!("status change request {id}")).into())
}

impl<S, C, K> OrderEngine<S, C, K>
where
    S: OrderStore,
    C: CapabilityCheck,
    K: Clock,
{
    /// Escalate a transition the actor may not apply directly.
    ///
    /// `current_status` is the status the requester was looking at; the
    /// request pins it and is refused as `StaleRequest` when the stored order
    /// has already moved on. The balance guard is not consulted here;
    /// approval re-runs it.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, from = %current_status, to = %requested))]
    pub fn request_status_change(
        &self,
        actor: &Principal,
        order_id: OrderId,
        current_status: OrderStatus,
        requested: OrderStatus,
        reason: &str,
    ) -> EngineResult<OrderStatusChangeRequest> {
        let now = self.clock.now();

        let request = self.store.transaction(|uow| -> EngineResult<_> {
            let order = load_order(&*uow, order_id)?;
            order.ensure_active()?;

            let request =
                OrderStatusChangeRequest::new(order_id, actor.id, current_status, requested, reason, now)?;
            request.ensure_fresh(order.status())?;
            let mut trail = AuditTrail::by(actor, now);
            trail.row(order_id, None, Some(&request));
            uow.insert_status_change_request(request.clone())?;
            trail.commit(uow)?;
            Ok(request)
        })?;

        tracing::info!(request_id = %request.id, from = %request.current_status, "status change requested");
        Ok(request)
    }

    /// Approve and apply a status-change request in one transaction.
    ///
    /// Inside that transaction the order is re-loaded and must still be in
    /// the status the request was filed against (`StaleRequest` otherwise).
    /// The balance guard runs again; approval never overrides it.
    #[tracing::instrument(skip_all, fields(request_id = %request_id, reviewer = %reviewer.id))]
    pub fn approve_status_change(
        &self,
        reviewer: &Principal,
        request_id: StatusChangeRequestId,
        review_notes: Option<String>,
    ) -> EngineResult<Transition> {
        require(&self.capabilities, reviewer, &Permission::ADMIN)?;
        let now = self.clock.now();

        let result = self.store.transaction(|uow| -> EngineResult<_> {
            let request_before = load_status_change_request(&*uow, request_id)?;
            request_before.ensure_pending()?;

            let order_before = load_order(&*uow, request_before.order_id)?;
            order_before.ensure_active()?;
            request_before.ensure_fresh(order_before.status())?;

            let mut order = order_before.clone();
            let transition = order
                .request_transition(request_before.requested_status, true)?
                .ok_or_else(|| DomainError::invalid_state("order already has the requested status"))?;

            let mut request = request_before.clone();
            request.approve(reviewer.id, review_notes, now)?;

            let mut trail = AuditTrail::by(reviewer, now);
            trail.order(Some(&order_before), &order);
            trail.row(request.order_id, Some(&request_before), Some(&request));

            uow.save_order(order, ExpectedVersion::Exact(order_before.version()))?;
            uow.save_status_change_request(request)?;
            trail.commit(uow)?;
            Ok(transition)
        });

        match &result {
            Ok(t) => tracing::info!(from = %t.from, to = %t.to, "status change approved and applied"),
            Err(err) => tracing::warn!(error = %err, "status change approval refused"),
        }
        result
    }

    #[tracing::instrument(skip_all, fields(request_id = %request_id, reviewer = %reviewer.id))]
    pub fn reject_status_change(
        &self,
        reviewer: &Principal,
        request_id: StatusChangeRequestId,
        review_notes: &str,
    ) -> EngineResult<OrderStatusChangeRequest> {
        require(&self.capabilities, reviewer, &Permission::ADMIN)?;
        let now = self.clock.now();

        let rejected = self.store.transaction(|uow| -> EngineResult<_> {
            let before = load_status_change_request(&*uow, request_id)?;
            let mut request = before.clone();
            request.reject(reviewer.id, review_notes, now)?;

            let mut trail = AuditTrail::by(reviewer, now);
            trail.row(request.order_id, Some(&before), Some(&request));
            uow.save_status_change_request(request.clone())?;
            trail.commit(uow)?;
            Ok(request)
        })?;

        tracing::info!(order_id = %rejected.order_id, "status change rejected");
        Ok(rejected)
    }

    /// PENDING requests, oldest first, optionally scoped to one order.
    pub fn find_pending_status_changes(
        &self,
        order_id: Option<OrderId>,
    ) -> EngineResult<Vec<OrderStatusChangeRequest>> {
        self.store.read(|uow| {
            Ok(uow
                .status_change_requests(order_id)?
                .into_iter()
                .filter(OrderStatusChangeRequest::is_pending)
                .collect())
        })
    }
}
