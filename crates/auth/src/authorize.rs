use std::collections::{HashMap, HashSet};

use thiserror::Error;

use orderflow_core::DomainError;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(perm) => DomainError::forbidden(perm),
        }
    }
}

/// Authorize a principal against its directly granted permissions.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// The engine's view of the role/permission subsystem: a boolean fact.
///
/// Injected into the engine so it can be driven without a real RBAC backend.
pub trait CapabilityCheck: Send + Sync {
    fn has_capability(&self, actor: &Principal, capability: &Permission) -> bool;

    fn is_admin(&self, actor: &Principal) -> bool {
        self.has_capability(actor, &Permission::ADMIN)
    }
}

impl<C> CapabilityCheck for std::sync::Arc<C>
where
    C: CapabilityCheck + ?Sized,
{
    fn has_capability(&self, actor: &Principal, capability: &Permission) -> bool {
        (**self).has_capability(actor, capability)
    }
}

/// Fail with `DomainError::Forbidden` unless `actor` holds `capability`.
pub fn require<C>(check: &C, actor: &Principal, capability: &Permission) -> Result<(), DomainError>
where
    C: CapabilityCheck + ?Sized,
{
    if check.has_capability(actor, capability) {
        Ok(())
    } else {
        tracing::warn!(actor = %actor.id, capability = %capability, "capability check failed");
        Err(AuthzError::Forbidden(capability.as_str().to_string()).into())
    }
}

/// Static role → permission table.
///
/// Effective permissions are the union of the principal's roles' grants and
/// its directly granted permissions; `"*"` matches anything.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    grants: HashMap<Role, Vec<Permission>>,
}

impl RolePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, role: Role, permission: Permission) -> Self {
        self.grants.entry(role).or_default().push(permission);
        self
    }

    /// The table the order back office ships with.
    pub fn standard() -> Self {
        Self::new()
            .grant(Role::ADMIN, Permission::WILDCARD)
            .grant(Role::MANAGER, Permission::APPLY_DISCOUNTS)
            .grant(Role::MANAGER, Permission::DELETE_DISCOUNTS)
            .grant(Role::SALES, Permission::APPLY_DISCOUNTS)
    }

    pub fn effective_permissions(&self, actor: &Principal) -> HashSet<String> {
        let mut effective: HashSet<String> = actor
            .permissions
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        for role in &actor.roles {
            if let Some(perms) = self.grants.get(role) {
                effective.extend(perms.iter().map(|p| p.as_str().to_string()));
            }
        }
        effective
    }
}

impl CapabilityCheck for RolePolicy {
    fn has_capability(&self, actor: &Principal, capability: &Permission) -> bool {
        if authorize(actor, capability).is_ok() {
            return true;
        }
        actor
            .roles
            .iter()
            .filter_map(|role| self.grants.get(role))
            .flatten()
            .any(|p| p.is_wildcard() || p == capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::UserId;

    fn test_principal() -> Principal {
        Principal::new(UserId::new(), "tester")
    }

    #[test]
    fn direct_permission_authorizes() {
        let p = test_principal().with_permission(Permission::APPLY_DISCOUNTS);
        assert!(authorize(&p, &Permission::APPLY_DISCOUNTS).is_ok());
        assert_eq!(
            authorize(&p, &Permission::DELETE_DISCOUNTS),
            Err(AuthzError::Forbidden("orders.delete_discounts".to_string()))
        );
    }

    #[test]
    fn admin_role_implies_every_capability() {
        let policy = RolePolicy::standard();
        let admin = test_principal().with_role(Role::ADMIN);
        assert!(policy.is_admin(&admin));
        assert!(policy.has_capability(&admin, &Permission::DELETE_DISCOUNTS));
        assert!(policy.has_capability(&admin, &Permission::new("anything.else")));
    }

    #[test]
    fn sales_can_apply_but_not_delete_discounts() {
        let policy = RolePolicy::standard();
        let sales = test_principal().with_role(Role::SALES);
        assert!(policy.has_capability(&sales, &Permission::APPLY_DISCOUNTS));
        assert!(!policy.has_capability(&sales, &Permission::DELETE_DISCOUNTS));
        assert!(!policy.is_admin(&sales));
    }

    #[test]
    fn require_maps_to_forbidden_domain_error() {
        let policy = RolePolicy::standard();
        let cashier = test_principal().with_role(Role::CASHIER);
        match require(&policy, &cashier, &Permission::APPLY_DISCOUNTS) {
            Err(DomainError::Forbidden(cap)) => assert_eq!(cap, "orders.apply_discounts"),
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn effective_permissions_merge_roles_and_direct_grants() {
        let policy = RolePolicy::standard();
        let p = test_principal()
            .with_role(Role::MANAGER)
            .with_permission(Permission::new("orders.export"));
        let eff = policy.effective_permissions(&p);
        assert!(eff.contains("orders.apply_discounts"));
        assert!(eff.contains("orders.delete_discounts"));
        assert!(eff.contains("orders.export"));
        assert!(!eff.contains("*"));
    }
}
