use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use orderflow_core::{OrderId, UserId};

use crate::model::AuditModel;

/// Flat field → value map of one row, as captured before/after a write.
///
/// Ordered so that diffs and serialized logs are deterministic.
pub type FieldMap = BTreeMap<String, JsonValue>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row-level diff in the append-only audit stream.
///
/// Notes:
/// - Keyed by `(model, record_id)`; `order_id` is the aggregate the row
///   belongs to, so a whole order's history can be loaded in one read.
/// - **Append-only**: entries are never mutated after insertion.
/// - `old_data` is empty for `Create`, `new_data` is empty for `Delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    pub order_id: OrderId,
    pub model: AuditModel,
    pub record_id: Uuid,
    pub action: AuditAction,
    #[serde(default)]
    pub old_data: FieldMap,
    #[serde(default)]
    pub new_data: FieldMap,
    pub user: Option<UserId>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        model: AuditModel,
        record_id: Uuid,
        action: AuditAction,
        old_data: FieldMap,
        new_data: FieldMap,
        user: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            order_id,
            model,
            record_id,
            action,
            old_data,
            new_data,
            user,
            user_name: None,
            created_at,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Value this entry recorded for `field`, preferring the post-write side.
    pub fn latest_value(&self, field: &str) -> Option<&JsonValue> {
        self.new_data.get(field).or_else(|| self.old_data.get(field))
    }

    /// Build the entry describing one row going from `before` to `after`.
    ///
    /// - `None → Some` is a `Create` carrying the full row.
    /// - `Some → None`, or `deleted_at` going from null to set, is a `Delete`
    ///   carrying the full prior row.
    /// - Otherwise an `Update` carrying only the fields that changed.
    ///
    /// Returns `None` when nothing changed.
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshots(
        order_id: OrderId,
        model: AuditModel,
        record_id: Uuid,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
        user: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        let (action, old_data, new_data) = match (before, after) {
            (None, None) => return None,
            (None, Some(after)) => (AuditAction::Create, FieldMap::new(), after.clone()),
            (Some(before), None) => (AuditAction::Delete, before.clone(), FieldMap::new()),
            (Some(before), Some(after)) if is_soft_delete(before, after) => {
                (AuditAction::Delete, before.clone(), FieldMap::new())
            }
            (Some(before), Some(after)) => {
                let (old_data, new_data) = dirty_fields(before, after);
                if new_data.is_empty() && old_data.is_empty() {
                    return None;
                }
                (AuditAction::Update, old_data, new_data)
            }
        };

        Some(Self::new(
            order_id, model, record_id, action, old_data, new_data, user, created_at,
        ))
    }
}

fn is_null_or_missing(map: &FieldMap, field: &str) -> bool {
    map.get(field).is_none_or(JsonValue::is_null)
}

fn is_soft_delete(before: &FieldMap, after: &FieldMap) -> bool {
    is_null_or_missing(before, "deleted_at") && !is_null_or_missing(after, "deleted_at")
}

/// Old/new values of every field whose value differs between the snapshots.
fn dirty_fields(before: &FieldMap, after: &FieldMap) -> (FieldMap, FieldMap) {
    let mut old_data = FieldMap::new();
    let mut new_data = FieldMap::new();
    for key in before.keys().chain(after.keys()) {
        let old = before.get(key).unwrap_or(&JsonValue::Null);
        let new = after.get(key).unwrap_or(&JsonValue::Null);
        if old != new && !new_data.contains_key(key) {
            old_data.insert(key.clone(), old.clone());
            new_data.insert(key.clone(), new.clone());
        }
    }
    (old_data, new_data)
}
