use std::fmt::Write as _;
use std::fs;

use anyhow::{Context, Result, bail};

use orderflow_audit::{AuditLogEntry, TimelineEvent, TimelineOptions, build_timeline};
use orderflow_core::OrderId;

pub struct TimelineArgs {
    pub log_path: String,
    pub order: Option<OrderId>,
    pub gap_millis: i64,
    pub json: bool,
}

pub fn parse_order_id(raw: &str) -> Result<OrderId> {
    raw.parse::<OrderId>()
        .with_context(|| format!("invalid --order {raw}"))
}

pub fn timeline(args: &TimelineArgs) -> Result<String> {
    if args.gap_millis <= 0 {
        bail!("--gap-millis must be positive, got {}", args.gap_millis);
    }

    let raw = fs::read_to_string(&args.log_path)
        .with_context(|| format!("read audit log {}", args.log_path))?;
    let entries: Vec<AuditLogEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parse audit log {}", args.log_path))?;
    tracing::info!(path = %args.log_path, entries = entries.len(), "audit log loaded");

    let options = TimelineOptions::with_gap_millis(args.gap_millis);
    let per_order: Vec<(OrderId, Vec<TimelineEvent>)> = split_by_order(entries, args.order)
        .into_iter()
        .map(|(order_id, entries)| (order_id, build_timeline(&entries, &options)))
        .collect();

    if let (Some(wanted), true) = (args.order, per_order.is_empty()) {
        bail!("no audit entries for order {wanted}");
    }

    if args.json {
        let value: serde_json::Map<String, serde_json::Value> = per_order
            .iter()
            .map(|(id, events)| -> Result<_, serde_json::Error> {
                Ok((id.to_string(), serde_json::to_value(events)?))
            })
            .collect::<Result<_, serde_json::Error>>()
            .context("serialize timeline")?;
        let mut out = serde_json::to_string_pretty(&value).context("serialize timeline")?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = String::new();
    for (order_id, events) in &per_order {
        let _ = writeln!(out, "order {order_id}");
        out.push_str(&render_timeline(events));
    }
    Ok(out)
}

/// Entries grouped per order, orders in first-seen order.
fn split_by_order(entries: Vec<AuditLogEntry>, only: Option<OrderId>) -> Vec<(OrderId, Vec<AuditLogEntry>)> {
    let mut groups: Vec<(OrderId, Vec<AuditLogEntry>)> = Vec::new();
    for entry in entries {
        if only.is_some_and(|id| id != entry.order_id) {
            continue;
        }
        match groups.iter_mut().find(|(id, _)| *id == entry.order_id) {
            Some((_, bucket)) => bucket.push(entry),
            None => groups.push((entry.order_id, vec![entry])),
        }
    }
    groups
}

fn render_timeline(events: &[TimelineEvent]) -> String {
    let mut out = String::new();
    for event in events {
        let who = match (&event.user_name, &event.user) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => "system".to_string(),
        };
        let _ = writeln!(
            out,
            "  {} {} by {} ({} entries)",
            event.started_at.to_rfc3339(),
            event.action,
            who,
            event.entry_count
        );
        for line in event.summary_lines() {
            let _ = writeln!(out, "    - {line}");
        }
    }
    out
}
