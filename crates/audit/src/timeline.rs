//! Change-event aggregator.
//!
//! Folds the raw, row-level audit stream of one order into logical events:
//!
//! ```text
//! entries (any order)
//!   ↓ sort by created_at (stable)
//!   ↓ sliding-window grouping: gap to the *previous* entry <= max_gap
//!   ↓ per group: allow-listed field diffs, deduplicated
//!   ↓ line items sub-grouped per record, labelled by description
//! events (most recent first)
//! ```
//!
//! A pure function of its input: re-running it over the same log yields the
//! same events, so the timeline is never stored, only re-derived.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use orderflow_core::UserId;

use crate::entry::{AuditAction, AuditLogEntry};
use crate::model::{AuditModel, field_label};

/// Entries at most this far apart (from one to the next) belong to one event.
pub const DEFAULT_GROUP_GAP_MILLIS: i64 = 2_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimelineOptions {
    pub max_gap: Duration,
}

impl TimelineOptions {
    pub fn with_gap_millis(millis: i64) -> Self {
        Self {
            max_gap: Duration::milliseconds(millis),
        }
    }
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self::with_gap_millis(DEFAULT_GROUP_GAP_MILLIS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Changed { old: String, new: String },
    Added { value: String },
    Removed { value: String },
}

impl ChangeKind {
    fn parts(&self) -> (&str, &str) {
        match self {
            ChangeKind::Changed { old, new } => (old, new),
            ChangeKind::Added { value } => ("", value),
            ChangeKind::Removed { value } => (value, ""),
        }
    }
}

/// One reported field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub model: AuditModel,
    pub field: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl FieldChange {
    pub fn describe(&self) -> String {
        match &self.kind {
            ChangeKind::Changed { old, new } if old.is_empty() => format!("{} set to {new}", self.label),
            ChangeKind::Changed { old, new } => format!("{} {old} → {new}", self.label),
            ChangeKind::Added { value } => format!("{} {value}", self.label),
            ChangeKind::Removed { value } => format!("{} {value} removed", self.label),
        }
    }
}

/// Changes to one line item within an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemChanges {
    pub record_id: Uuid,
    pub description: String,
    pub action: AuditAction,
    pub changes: Vec<FieldChange>,
}

impl ItemChanges {
    /// "Item X: quantity 2 → 3"
    pub fn describe(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|c| format!("Item {}: {}", self.description, c.describe()))
            .collect()
    }
}

/// One logical user action reconstructed from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub action: AuditAction,
    pub user: Option<UserId>,
    pub user_name: Option<String>,
    pub entry_count: usize,
    pub changes: Vec<FieldChange>,
    pub items: Vec<ItemChanges>,
}

impl TimelineEvent {
    /// True when every member only touched suppressed fields.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.items.is_empty()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .changes
            .iter()
            .map(|c| format!("{}: {}", c.model.label(), c.describe()))
            .collect();
        for item in &self.items {
            lines.extend(item.describe());
        }
        lines
    }
}

/// Build the timeline of one aggregate's audit stream, most recent event first.
pub fn build_timeline(entries: &[AuditLogEntry], options: &TimelineOptions) -> Vec<TimelineEvent> {
    let mut sorted: Vec<&AuditLogEntry> = entries.iter().collect();
    // Stable: entries written in one transaction keep their append order.
    sorted.sort_by_key(|e| e.created_at);

    let descriptions = resolve_item_descriptions(&sorted);

    let mut events: Vec<TimelineEvent> = group_by_gap(&sorted, options.max_gap)
        .into_iter()
        .map(|group| summarize_group(&group, &descriptions))
        .collect();
    events.reverse();
    events
}

fn group_by_gap<'a>(sorted: &[&'a AuditLogEntry], max_gap: Duration) -> Vec<Vec<&'a AuditLogEntry>> {
    let mut groups: Vec<Vec<&'a AuditLogEntry>> = Vec::new();
    let mut previous: Option<DateTime<Utc>> = None;

    for entry in sorted {
        match (previous, groups.last_mut()) {
            (Some(prev), Some(current)) if entry.created_at - prev <= max_gap => current.push(*entry),
            _ => groups.push(vec![*entry]),
        }
        previous = Some(entry.created_at);
    }

    groups
}

/// UPDATE if any member is an update (or members disagree), else the shared action.
fn dominant_action(actions: impl IntoIterator<Item = AuditAction>) -> AuditAction {
    let mut shared: Option<AuditAction> = None;
    for action in actions {
        match shared {
            _ if action == AuditAction::Update => return AuditAction::Update,
            None => shared = Some(action),
            Some(existing) if existing != action => return AuditAction::Update,
            Some(_) => {}
        }
    }
    shared.unwrap_or(AuditAction::Update)
}

/// Item descriptions from anywhere in the stream; the latest one carried wins.
fn resolve_item_descriptions(sorted: &[&AuditLogEntry]) -> HashMap<Uuid, String> {
    let mut descriptions: HashMap<Uuid, String> = HashMap::new();

    for entry in sorted.iter().filter(|e| e.model.is_line_item()) {
        let text = display_value(entry.latest_value("description"));
        if text.is_empty() {
            continue;
        }
        // A DELETE only replays the prior row; it never renames.
        if entry.action == AuditAction::Delete {
            descriptions.entry(entry.record_id).or_insert(text);
        } else {
            descriptions.insert(entry.record_id, text);
        }
    }

    descriptions
}

fn summarize_group(group: &[&AuditLogEntry], descriptions: &HashMap<Uuid, String>) -> TimelineEvent {
    let mut seen: HashSet<(AuditModel, Option<Uuid>, String, String, String)> = HashSet::new();
    let mut changes: Vec<FieldChange> = Vec::new();
    let mut items: Vec<ItemChanges> = Vec::new();
    let mut item_index: HashMap<Uuid, usize> = HashMap::new();

    for entry in group {
        let scope = entry.model.is_line_item().then_some(entry.record_id);

        if let Some(record_id) = scope {
            let idx = *item_index.entry(record_id).or_insert_with(|| {
                items.push(ItemChanges {
                    record_id,
                    description: descriptions
                        .get(&record_id)
                        .cloned()
                        .unwrap_or_else(|| short_label(record_id)),
                    action: entry.action,
                    changes: Vec::new(),
                });
                items.len() - 1
            });
            let item = &mut items[idx];
            item.action = dominant_action([item.action, entry.action]);
        }

        for change in entry_changes(entry) {
            let (old, new) = change.kind.parts();
            let key = (change.model, scope, change.field.clone(), old.to_string(), new.to_string());
            if !seen.insert(key) {
                continue;
            }
            match scope.and_then(|id| item_index.get(&id)) {
                Some(&idx) => items[idx].changes.push(change),
                None => changes.push(change),
            }
        }
    }

    items.retain(|item| !item.changes.is_empty());

    // Groups are never empty; the first/last lookups cannot fail.
    let started_at = group.first().map(|e| e.created_at).unwrap_or_default();
    let ended_at = group.last().map(|e| e.created_at).unwrap_or(started_at);

    TimelineEvent {
        started_at,
        ended_at,
        action: dominant_action(group.iter().map(|e| e.action)),
        user: group.iter().find_map(|e| e.user),
        user_name: group.iter().find_map(|e| e.user_name.clone()),
        entry_count: group.len(),
        changes,
        items,
    }
}

/// Allow-listed field changes carried by a single entry.
fn entry_changes(entry: &AuditLogEntry) -> Vec<FieldChange> {
    let model = entry.model;

    model
        .tracked_fields()
        .iter()
        .filter_map(|field| {
            let kind = match entry.action {
                AuditAction::Update => {
                    if !entry.old_data.contains_key(*field) && !entry.new_data.contains_key(*field) {
                        return None;
                    }
                    let old = display_value(entry.old_data.get(*field));
                    let new = display_value(entry.new_data.get(*field));
                    if old == new {
                        return None;
                    }
                    ChangeKind::Changed { old, new }
                }
                AuditAction::Create => {
                    let value = display_value(entry.new_data.get(*field));
                    if value.is_empty() {
                        return None;
                    }
                    ChangeKind::Added { value }
                }
                AuditAction::Delete => {
                    let value = display_value(entry.old_data.get(*field));
                    if value.is_empty() {
                        return None;
                    }
                    ChangeKind::Removed { value }
                }
            };
            Some(FieldChange {
                model,
                field: (*field).to_string(),
                label: field_label(field).to_string(),
                kind,
            })
        })
        .collect()
}

/// Stringified form used both for comparison and display.
fn display_value(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn short_label(record_id: Uuid) -> String {
    let id = record_id.simple().to_string();
    format!("#{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FieldMap;
    use orderflow_core::OrderId;
    use proptest::prelude::*;
    use serde_json::json;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fields(pairs: &[(&str, JsonValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn entry(
        order_id: OrderId,
        model: AuditModel,
        record_id: Uuid,
        action: AuditAction,
        old: FieldMap,
        new: FieldMap,
        at_ms: i64,
    ) -> AuditLogEntry {
        AuditLogEntry::new(
            order_id,
            model,
            record_id,
            action,
            old,
            new,
            Some(UserId::from_uuid(Uuid::nil())),
            test_time() + Duration::milliseconds(at_ms),
        )
    }

    fn qty_update(order_id: OrderId, item: Uuid, from: i64, to: i64, at_ms: i64) -> AuditLogEntry {
        entry(
            order_id,
            AuditModel::OrderItem,
            item,
            AuditAction::Update,
            fields(&[("quantity", json!(from))]),
            fields(&[("quantity", json!(to))]),
            at_ms,
        )
    }

    #[test]
    fn entries_split_on_gap_larger_than_threshold() {
        let order_id = OrderId::new();
        let item = Uuid::now_v7();
        let log = vec![
            qty_update(order_id, item, 1, 2, 0),
            qty_update(order_id, item, 2, 3, 1_400),
            qty_update(order_id, item, 3, 4, 4_400),
        ];

        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events.len(), 2);
        // Most recent first.
        assert_eq!(events[0].entry_count, 1);
        assert_eq!(events[1].entry_count, 2);
        assert!(events[0].started_at > events[1].started_at);
    }

    #[test]
    fn window_slides_from_previous_entry_not_group_start() {
        let order_id = OrderId::new();
        let item = Uuid::now_v7();
        // Five entries 1.5s apart: 6s end to end, but never a gap over 2s.
        let log: Vec<_> = (0..5)
            .map(|i| qty_update(order_id, item, i, i + 1, i * 1_500))
            .collect();

        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entry_count, 5);
        assert_eq!(events[0].ended_at - events[0].started_at, Duration::milliseconds(6_000));
    }

    #[test]
    fn gap_exactly_at_threshold_joins_the_group() {
        let order_id = OrderId::new();
        let item = Uuid::now_v7();
        let log = vec![
            qty_update(order_id, item, 1, 2, 0),
            qty_update(order_id, item, 2, 3, 2_000),
        ];
        assert_eq!(build_timeline(&log, &TimelineOptions::default()).len(), 1);
    }

    #[test]
    fn update_dominates_mixed_groups() {
        assert_eq!(
            dominant_action([AuditAction::Create, AuditAction::Update]),
            AuditAction::Update
        );
        assert_eq!(
            dominant_action([AuditAction::Create, AuditAction::Create]),
            AuditAction::Create
        );
        assert_eq!(
            dominant_action([AuditAction::Create, AuditAction::Delete]),
            AuditAction::Update
        );
        assert_eq!(dominant_action([AuditAction::Delete]), AuditAction::Delete);
    }

    #[test]
    fn suppressed_fields_and_unchanged_values_are_not_reported() {
        let order_id = OrderId::new();
        let log = vec![entry(
            order_id,
            AuditModel::Order,
            *order_id.as_uuid(),
            AuditAction::Update,
            fields(&[("status", json!("DRAFT")), ("total", json!(500)), ("version", json!(1))]),
            fields(&[("status", json!("CONFIRMED")), ("total", json!(500)), ("version", json!(2))]),
            0,
        )];

        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].changes,
            vec![FieldChange {
                model: AuditModel::Order,
                field: "status".to_string(),
                label: "status".to_string(),
                kind: ChangeKind::Changed {
                    old: "DRAFT".to_string(),
                    new: "CONFIRMED".to_string(),
                },
            }]
        );
    }

    #[test]
    fn create_reports_only_non_empty_fields() {
        let order_id = OrderId::new();
        let payment = Uuid::now_v7();
        let log = vec![entry(
            order_id,
            AuditModel::Payment,
            payment,
            AuditAction::Create,
            FieldMap::new(),
            fields(&[("amount", json!(8000)), ("method", json!("")), ("paid_at", JsonValue::Null)]),
            0,
        )];

        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events[0].action, AuditAction::Create);
        assert_eq!(events[0].changes.len(), 1);
        assert_eq!(
            events[0].changes[0].kind,
            ChangeKind::Added {
                value: "8000".to_string()
            }
        );
    }

    #[test]
    fn duplicate_triples_in_one_group_are_reported_once() {
        let order_id = OrderId::new();
        let order_record = *order_id.as_uuid();
        let status_change = |at| {
            entry(
                order_id,
                AuditModel::Order,
                order_record,
                AuditAction::Update,
                fields(&[("status", json!("READY"))]),
                fields(&[("status", json!("DELIVERED"))]),
                at,
            )
        };
        let log = vec![status_change(0), status_change(300)];

        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entry_count, 2);
        assert_eq!(events[0].changes.len(), 1);
    }

    #[test]
    fn item_changes_are_labelled_from_anywhere_in_the_stream() {
        let order_id = OrderId::new();
        let item = Uuid::now_v7();
        let log = vec![
            entry(
                order_id,
                AuditModel::OrderItem,
                item,
                AuditAction::Create,
                FieldMap::new(),
                fields(&[("description", json!("Oak table")), ("quantity", json!(2))]),
                0,
            ),
            qty_update(order_id, item, 2, 3, 60_000),
        ];

        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events.len(), 2);
        let latest = &events[0];
        assert!(latest.changes.is_empty());
        assert_eq!(latest.items.len(), 1);
        assert_eq!(latest.items[0].description, "Oak table");
        assert_eq!(latest.items[0].describe(), vec!["Item Oak table: quantity 2 → 3".to_string()]);
    }

    #[test]
    fn deleted_rows_supply_a_label_but_never_rename() {
        let order_id = OrderId::new();
        let (kept, renamed) = (Uuid::now_v7(), Uuid::now_v7());
        let log = vec![
            qty_update(order_id, kept, 1, 2, 0),
            entry(
                order_id,
                AuditModel::OrderItem,
                renamed,
                AuditAction::Update,
                fields(&[("description", json!("Stool"))]),
                fields(&[("description", json!("Bar stool"))]),
                10,
            ),
            entry(
                order_id,
                AuditModel::OrderItem,
                kept,
                AuditAction::Delete,
                fields(&[("description", json!("Bench")), ("quantity", json!(2))]),
                FieldMap::new(),
                60_000,
            ),
            entry(
                order_id,
                AuditModel::OrderItem,
                renamed,
                AuditAction::Delete,
                fields(&[("description", json!("Stool"))]),
                FieldMap::new(),
                60_010,
            ),
        ];

        let events = build_timeline(&log, &TimelineOptions::default());
        let labels: Vec<&str> = events[1].items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(labels, vec!["Bench", "Bar stool"]);
        assert!(events[0].items.iter().all(|i| i.action == AuditAction::Delete));
    }

    #[test]
    fn items_without_known_description_get_a_short_label() {
        let order_id = OrderId::new();
        let item = Uuid::now_v7();
        let log = vec![qty_update(order_id, item, 1, 5, 0)];
        let events = build_timeline(&log, &TimelineOptions::default());
        assert!(events[0].items[0].description.starts_with('#'));
        assert_eq!(events[0].items[0].description.len(), 9);
    }

    #[test]
    fn same_change_on_two_items_is_kept_per_item() {
        let order_id = OrderId::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let log = vec![qty_update(order_id, a, 1, 2, 0), qty_update(order_id, b, 1, 2, 10)];
        let events = build_timeline(&log, &TimelineOptions::default());
        assert_eq!(events[0].items.len(), 2);
    }

    #[test]
    fn empty_log_yields_no_events() {
        assert!(build_timeline(&[], &TimelineOptions::default()).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the timeline is a pure function of the log, every entry
        /// lands in exactly one event, and events come out newest first.
        #[test]
        fn timeline_is_idempotent_and_covers_every_entry(
            offsets in prop::collection::vec(0i64..20_000i64, 0..40),
            quantities in prop::collection::vec(0i64..5i64, 40),
        ) {
            let order_id = OrderId::new();
            let item = Uuid::now_v7();
            let log: Vec<_> = offsets
                .iter()
                .zip(quantities.iter())
                .map(|(at, q)| qty_update(order_id, item, *q, q + 1, *at))
                .collect();

            let options = TimelineOptions::default();
            let first = build_timeline(&log, &options);
            let second = build_timeline(&log, &options);
            prop_assert_eq!(&first, &second);

            let covered: usize = first.iter().map(|e| e.entry_count).sum();
            prop_assert_eq!(covered, log.len());

            for pair in first.windows(2) {
                prop_assert!(pair[0].started_at - pair[1].ended_at > options.max_gap);
            }
        }
    }
}
