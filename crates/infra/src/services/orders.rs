use orderflow_auth::{CapabilityCheck, Permission, Principal, require};
use orderflow_core::{
    Clock, DiscountId, ExpectedVersion, Money, OrderId, OrderItemId, PaymentId, TaxRate,
};
use orderflow_orders::{
    ItemPatch, NewItem, Order, OrderStatus, PaymentMethod, Transition, allowed_targets, ledger,
};

use super::{AuditTrail, EngineResult, OrderEngine, load_order};
use crate::store::OrderStore;

impl<S, C, K> OrderEngine<S, C, K>
where
    S: OrderStore,
    C: CapabilityCheck,
    K: Clock,
{
    #[tracing::instrument(skip_all, fields(actor = %actor.id))]
    pub fn create_order(&self, actor: &Principal, apply_tax: bool, tax_rate: TaxRate) -> EngineResult<Order> {
        let now = self.clock.now();
        let order = Order::new_draft(OrderId::new(), actor.id, apply_tax, tax_rate, now);

        let created = self.store.transaction(|uow| -> EngineResult<_> {
            let mut trail = AuditTrail::by(actor, now);
            trail.order(None, &order);
            uow.save_order(order.clone(), ExpectedVersion::Exact(0))?;
            trail.commit(uow)?;
            load_order(&*uow, order.order_id())
        })?;

        tracing::info!(order_id = %created.order_id(), apply_tax, tax_rate = %tax_rate, "order created");
        Ok(created)
    }

    pub fn get_order(&self, order_id: OrderId) -> EngineResult<Order> {
        self.store.read(|uow| load_order(uow, order_id))
    }

    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id))]
    pub fn add_item(&self, actor: &Principal, order_id: OrderId, item: NewItem) -> EngineResult<OrderItemId> {
        let item_id = self.mutate_order(actor, order_id, |order, uow| {
            self.ensure_can_edit(uow, actor, order)?;
            Ok(order.add_item(item)?)
        })?;
        tracing::info!(item_id = %item_id, "item added");
        Ok(item_id)
    }

    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, item_id = %item_id))]
    pub fn update_item(
        &self,
        actor: &Principal,
        order_id: OrderId,
        item_id: OrderItemId,
        patch: ItemPatch,
    ) -> EngineResult<()> {
        self.mutate_order(actor, order_id, |order, uow| {
            self.ensure_can_edit(uow, actor, order)?;
            Ok(order.update_item(item_id, patch)?)
        })?;
        tracing::info!("item updated");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, item_id = %item_id))]
    pub fn remove_item(&self, actor: &Principal, order_id: OrderId, item_id: OrderItemId) -> EngineResult<()> {
        let now = self.clock.now();
        self.mutate_order(actor, order_id, |order, uow| {
            self.ensure_can_edit(uow, actor, order)?;
            Ok(order.remove_item(item_id, now)?)
        })?;
        tracing::info!("item removed");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id))]
    pub fn set_tax(
        &self,
        actor: &Principal,
        order_id: OrderId,
        apply_tax: bool,
        tax_rate: TaxRate,
    ) -> EngineResult<()> {
        self.mutate_order(actor, order_id, |order, uow| {
            self.ensure_can_edit(uow, actor, order)?;
            Ok(order.set_tax(apply_tax, tax_rate)?)
        })?;
        tracing::info!(apply_tax, tax_rate = %tax_rate, "tax updated");
        Ok(())
    }

    /// Soft delete. DRAFT orders may be deleted by anyone who may edit them;
    /// later statuses need an admin.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id))]
    pub fn delete_order(&self, actor: &Principal, order_id: OrderId) -> EngineResult<()> {
        let now = self.clock.now();
        self.mutate_order(actor, order_id, |order, _| {
            if !order.is_draft() {
                require(&self.capabilities, actor, &Permission::ADMIN)?;
            }
            Ok(order.mark_deleted(now)?)
        })?;
        tracing::info!("order deleted");
        Ok(())
    }

    /// Move the order to `target`.
    ///
    /// Returns `Ok(None)` for the same-status no-op. A
    /// `RequiresAuthorization` error means the caller should escalate through
    /// [`OrderEngine::request_status_change`].
    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, to = %target))]
    pub fn request_transition(
        &self,
        actor: &Principal,
        order_id: OrderId,
        target: OrderStatus,
    ) -> EngineResult<Option<Transition>> {
        let privileged = self.capabilities.is_admin(actor);
        let result = self.mutate_order(actor, order_id, |order, _| {
            Ok(order.request_transition(target, privileged)?)
        });

        match &result {
            Ok(Some(t)) => tracing::info!(from = %t.from, to = %t.to, "status changed"),
            Ok(None) => tracing::debug!("status unchanged"),
            Err(err) => tracing::warn!(error = %err, "transition refused"),
        }
        result
    }

    /// Statuses this actor could move the order to (balance guard ignored).
    pub fn allowed_targets(&self, actor: &Principal, order_id: OrderId) -> EngineResult<Vec<OrderStatus>> {
        let order = self.get_order(order_id)?;
        Ok(allowed_targets(order.status(), self.capabilities.is_admin(actor)))
    }

    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, amount = %amount))]
    pub fn record_payment(
        &self,
        actor: &Principal,
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
    ) -> EngineResult<PaymentId> {
        let now = self.clock.now();
        let (payment_id, credit) = self.mutate_order(actor, order_id, |order, _| {
            let id = ledger::record_payment(order, amount, method, actor.id, now)?;
            Ok((id, order.overpayment()))
        })?;

        tracing::info!(payment_id = %payment_id, method = %method, "payment recorded");
        if let Some(credit) = credit {
            tracing::warn!(credit = %credit, "order is overpaid; balance is a customer credit");
        }
        Ok(payment_id)
    }

    /// Requires the `apply_discounts` capability.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, amount = %amount))]
    pub fn apply_discount(
        &self,
        actor: &Principal,
        order_id: OrderId,
        amount: Money,
        reason: &str,
    ) -> EngineResult<DiscountId> {
        require(&self.capabilities, actor, &Permission::APPLY_DISCOUNTS)?;

        let now = self.clock.now();
        let min_reason = self.config.min_discount_reason_chars;
        let discount_id = self.mutate_order(actor, order_id, |order, _| {
            Ok(ledger::apply_discount(order, amount, reason, actor.id, now, min_reason)?)
        })?;
        tracing::info!(discount_id = %discount_id, "discount applied");
        Ok(discount_id)
    }

    /// Requires the stronger `delete_discounts` capability.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, actor = %actor.id, discount_id = %discount_id))]
    pub fn remove_discount(
        &self,
        actor: &Principal,
        order_id: OrderId,
        discount_id: DiscountId,
    ) -> EngineResult<()> {
        require(&self.capabilities, actor, &Permission::DELETE_DISCOUNTS)?;

        let removed = self.mutate_order(actor, order_id, |order, _| {
            Ok(ledger::remove_discount(order, discount_id)?)
        })?;
        tracing::info!(amount = %removed.amount, "discount removed");
        Ok(())
    }
}
