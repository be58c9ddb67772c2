use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission (capability) identifier.
///
/// Permissions are modeled as opaque strings (e.g. "orders.apply_discounts").
/// A special wildcard permission `"*"` grants everything; policy layers use it
/// for administrators instead of enumerating every capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Elevated order privileges: privileged status transitions, editing locked
    /// orders, reviewing edit and status-change requests.
    pub const ADMIN: Permission = Permission(Cow::Borrowed("orders.admin"));
    pub const APPLY_DISCOUNTS: Permission = Permission(Cow::Borrowed("orders.apply_discounts"));
    /// Stronger than applying one.
    pub const DELETE_DISCOUNTS: Permission = Permission(Cow::Borrowed("orders.delete_discounts"));
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
