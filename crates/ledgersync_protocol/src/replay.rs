//! Replay of queued operations onto a baseline snapshot.
//!
//! Ops are always applied in ascending id order, whatever order they are
//! passed in. Replay reads op timestamps only, never the clock, so the same
//! baseline and ops always give the same result.

use crate::operation::{OpPayload, SyncQueueOp};
use crate::record::{sort_newest_first, Record};
use crate::settings::{Category, CategoryPatch, Settings};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

fn in_id_order(ops: &[SyncQueueOp]) -> Vec<&SyncQueueOp> {
    let mut ordered: Vec<&SyncQueueOp> = ops.iter().collect();
    ordered.sort_by_key(|op| op.id);
    ordered
}

/// Applies record operations onto `baseline`.
///
/// Upserts replace by id (last write wins per id); batch upserts apply each
/// member in order. Non-record ops are ignored. The result is sorted newest
/// `created_at` first.
pub fn apply_to_records(baseline: &[Record], ops: &[SyncQueueOp]) -> Vec<Record> {
    let mut by_id: BTreeMap<String, Record> = baseline
        .iter()
        .map(|r| (r.id.clone(), r.clone()))
        .collect();

    for op in in_id_order(ops) {
        for record in op.payload.records() {
            by_id.insert(record.id.clone(), record.clone());
        }
    }

    let mut records: Vec<Record> = by_id.into_values().collect();
    sort_newest_first(&mut records);
    records
}

/// Applies settings and category operations onto `baseline`.
///
/// Record ops are ignored. When at least one op applies, `updated_at` is
/// stamped with the timestamp of the last applied op.
pub fn apply_to_settings(baseline: &Settings, ops: &[SyncQueueOp]) -> Settings {
    let mut settings = baseline.clone();
    let mut last_applied = None;

    for op in in_id_order(ops) {
        let ts = op.timestamp;
        match &op.payload {
            OpPayload::ExpenseUpsert { .. } | OpPayload::ExpenseUpsertBatch { .. } => continue,
            OpPayload::SettingsPatch { patch } => patch_settings(&mut settings, patch, op.id),
            OpPayload::CategoryAdd { category } => add_category(&mut settings, category, ts),
            OpPayload::CategoryUpdate { label, patch } => {
                update_category(&mut settings, label, patch, ts)
            }
            OpPayload::CategoryDelete { label } => delete_category(&mut settings, label),
            OpPayload::CategoryReorder { labels } => reorder_categories(&mut settings, labels),
        }
        last_applied = Some(ts);
    }

    if let Some(ts) = last_applied {
        settings.updated_at = Some(ts);
    }
    settings
}

fn patch_settings(settings: &mut Settings, patch: &Map<String, Value>, op_id: u64) {
    let mut document = match serde_json::to_value(&*settings) {
        Ok(Value::Object(map)) => map,
        _ => return,
    };
    for (key, value) in patch {
        document.insert(key.clone(), value.clone());
    }

    match serde_json::from_value::<Settings>(Value::Object(document)) {
        Ok(patched) => *settings = patched,
        Err(e) => warn!(op_id, error = %e, "skipping settings patch with invalid field types"),
    }
}

fn add_category(settings: &mut Settings, category: &Category, ts: DateTime<Utc>) {
    if settings.category(&category.label).is_some() {
        return;
    }

    let mut category = category.clone();
    if category.color.is_empty() {
        category.color = settings.next_color();
    }
    category.order = settings
        .categories
        .iter()
        .filter(|c| !c.is_other())
        .map(|c| c.order + 1)
        .max()
        .unwrap_or(0);
    category.updated_at = Some(ts);

    settings.categories.push(category);
    settings.normalize_order();
}

fn update_category(settings: &mut Settings, label: &str, patch: &CategoryPatch, ts: DateTime<Utc>) {
    let rename = patch.label.as_deref().filter(|new_label| {
        !new_label.is_empty()
            && !new_label.eq_ignore_ascii_case(label)
            && settings.category(new_label).is_none()
    });
    let rename = rename.map(str::to_string);

    let Some(category) = settings.categories.iter_mut().find(|c| c.matches(label)) else {
        return;
    };

    if let Some(new_label) = rename {
        if !category.is_other() {
            category.label = new_label;
        }
    }
    if let Some(color) = &patch.color {
        category.color = color.clone();
    }
    if let Some(icon) = &patch.icon {
        category.icon = Some(icon.clone());
    }
    category.updated_at = Some(ts);
    settings.normalize_order();
}

fn delete_category(settings: &mut Settings, label: &str) {
    let before = settings.categories.len();
    settings
        .categories
        .retain(|c| c.is_other() || !c.matches(label));
    if settings.categories.len() != before {
        settings.normalize_order();
    }
}

fn reorder_categories(settings: &mut Settings, labels: &[String]) {
    let mut remaining = std::mem::take(&mut settings.categories);
    remaining.sort_by_key(|c| c.order);

    let mut ordered = Vec::with_capacity(remaining.len());
    for label in labels {
        if let Some(pos) = remaining.iter().position(|c| c.matches(label)) {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.append(&mut remaining);

    for (index, category) in ordered.iter_mut().enumerate() {
        category.order = index as u32;
    }
    settings.categories = ordered;
    settings.normalize_order();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OTHER_CATEGORY;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn op(id: u64, payload: OpPayload) -> SyncQueueOp {
        SyncQueueOp {
            id,
            timestamp: ts(id as i64),
            payload,
        }
    }

    fn record(id: &str, amount: i64, created: i64) -> Record {
        Record::new(
            id,
            Decimal::new(amount, 0),
            "Food",
            NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            ts(created),
        )
    }

    fn labels(settings: &Settings) -> Vec<&str> {
        settings.categories.iter().map(|c| c.label.as_str()).collect()
    }

    fn bare_settings() -> Settings {
        let mut settings = Settings {
            categories: vec![
                Category::new("Food").with_color("#111111"),
                Category::new("Rent").with_color("#222222"),
                Category::new(OTHER_CATEGORY).with_color("#333333"),
            ],
            ..Settings::default()
        };
        for (i, c) in settings.categories.iter_mut().enumerate() {
            c.order = i as u32;
        }
        settings
    }

    #[test]
    fn records_last_write_wins_in_id_order() {
        let baseline = vec![record("1", 10, 0)];
        let ops = vec![
            op(3, OpPayload::ExpenseUpsert {
                expense: record("1", 30, 0),
            }),
            op(2, OpPayload::ExpenseUpsert {
                expense: record("1", 20, 0),
            }),
        ];

        let result = apply_to_records(&baseline, &ops);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].amount, Decimal::new(30, 0));
    }

    #[test]
    fn records_batch_applies_each_member() {
        let ops = vec![op(
            1,
            OpPayload::ExpenseUpsertBatch {
                expenses: vec![record("a", 1, 0), record("b", 2, 5)],
            },
        )];

        let result = apply_to_records(&[], &ops);
        let ids: Vec<_> = result.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn records_ignore_settings_ops() {
        let baseline = vec![record("1", 10, 0)];
        let ops = vec![op(1, OpPayload::CategoryDelete { label: "Food".into() })];
        assert_eq!(apply_to_records(&baseline, &ops), baseline);
    }

    #[test]
    fn settings_patch_is_shallow() {
        let baseline = bare_settings();
        let mut patch = Map::new();
        patch.insert("currency".into(), json!("EUR"));
        patch.insert("theme".into(), json!("dark"));

        let result = apply_to_settings(&baseline, &[op(1, OpPayload::SettingsPatch { patch })]);

        assert_eq!(result.currency, "EUR");
        assert_eq!(result.extra["theme"], "dark");
        assert_eq!(result.categories, baseline.categories);
        assert_eq!(result.updated_at, Some(ts(1)));
    }

    #[test]
    fn settings_patch_with_bad_types_is_skipped() {
        let baseline = bare_settings();
        let mut patch = Map::new();
        patch.insert("categories".into(), json!("not a list"));

        let result = apply_to_settings(&baseline, &[op(1, OpPayload::SettingsPatch { patch })]);
        assert_eq!(result.categories, baseline.categories);
    }

    #[test]
    fn add_dedupes_and_keeps_other_last() {
        let ops = vec![
            op(1, OpPayload::CategoryAdd {
                category: Category::new("Travel"),
            }),
            op(2, OpPayload::CategoryAdd {
                category: Category::new("travel"),
            }),
        ];

        let result = apply_to_settings(&bare_settings(), &ops);

        assert_eq!(labels(&result), vec!["Food", "Rent", "Travel", OTHER_CATEGORY]);
        let travel = result.category("Travel").unwrap();
        assert!(!travel.color.is_empty());
        assert_eq!(travel.order, 2);
        assert_eq!(travel.updated_at, Some(ts(1)));
        assert_eq!(result.category(OTHER_CATEGORY).unwrap().order, 3);
    }

    #[test]
    fn update_patches_by_label_and_stamps() {
        let patch = CategoryPatch {
            color: Some("#abcdef".into()),
            ..CategoryPatch::default()
        };
        let ops = vec![op(4, OpPayload::CategoryUpdate {
            label: "food".into(),
            patch,
        })];

        let result = apply_to_settings(&bare_settings(), &ops);
        let food = result.category("Food").unwrap();
        assert_eq!(food.color, "#abcdef");
        assert_eq!(food.updated_at, Some(ts(4)));
    }

    #[test]
    fn delete_never_removes_other_and_shifts_it_down() {
        let ops = vec![
            op(1, OpPayload::CategoryDelete { label: "Rent".into() }),
            op(2, OpPayload::CategoryDelete {
                label: OTHER_CATEGORY.into(),
            }),
        ];

        let result = apply_to_settings(&bare_settings(), &ops);

        assert_eq!(labels(&result), vec!["Food", OTHER_CATEGORY]);
        assert_eq!(result.category(OTHER_CATEGORY).unwrap().order, 1);
    }

    #[test]
    fn reorder_appends_missing_and_pins_other() {
        let ops = vec![op(1, OpPayload::CategoryReorder {
            labels: vec![OTHER_CATEGORY.into(), "Rent".into(), "Ghost".into()],
        })];

        let result = apply_to_settings(&bare_settings(), &ops);

        assert_eq!(labels(&result), vec!["Rent", "Food", OTHER_CATEGORY]);
        let orders: Vec<_> = result.categories.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn replay_is_deterministic() {
        let ops = vec![
            op(1, OpPayload::CategoryAdd {
                category: Category::new("Gifts"),
            }),
            op(2, OpPayload::CategoryReorder {
                labels: vec!["Gifts".into()],
            }),
            op(3, OpPayload::ExpenseUpsert {
                expense: record("x", 5, 0),
            }),
        ];

        let baseline = bare_settings();
        assert_eq!(apply_to_settings(&baseline, &ops), apply_to_settings(&baseline, &ops));
        assert_eq!(apply_to_records(&[], &ops), apply_to_records(&[], &ops));
    }

    #[test]
    fn no_ops_leaves_settings_untouched() {
        let baseline = bare_settings();
        assert_eq!(apply_to_settings(&baseline, &[]), baseline);
    }
}
