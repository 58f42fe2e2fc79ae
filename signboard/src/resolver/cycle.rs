//! Cycle-playback grouping.
//!
//! Layouts sharing a cycle group key collapse into one schedule slot: the
//! first item of the key stays in the flat list as the cycle parent, and the
//! whole group becomes its child sequence. Index 0 of the child list is an
//! empty sentinel standing in for the parent itself; the renderer steps
//! through the children using each item's play count.

use std::collections::HashMap;

use crate::schedule::ScheduleItem;

/// Collapse cycle groups into parents carrying their child sequences.
///
/// Non-cycling items (and overrides, which never group) pass through in
/// order.
pub fn group_cycles(items: Vec<ScheduleItem>) -> Vec<ScheduleItem> {
    let mut flat: Vec<ScheduleItem> = Vec::new();
    let mut buckets: HashMap<String, Vec<ScheduleItem>> = HashMap::new();

    for item in items {
        if item.is_cycle_playback && !item.is_override {
            match buckets.get_mut(&item.cycle_group_key) {
                Some(bucket) => bucket.push(item),
                None => {
                    buckets.insert(item.cycle_group_key.clone(), vec![item.clone()]);
                    flat.push(item);
                }
            }
        } else {
            flat.push(item);
        }
    }

    for entry in flat.iter_mut() {
        if entry.is_cycle_playback && !entry.is_override {
            if let Some(bucket) = buckets.remove(&entry.cycle_group_key) {
                let mut children = Vec::with_capacity(bucket.len() + 1);
                children.push(ScheduleItem::cycle_sentinel());
                children.extend(bucket);
                entry.cycle_children = children;
            }
        }
    }

    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn item(layout_id: i64) -> ScheduleItem {
        ScheduleItem::layout(layout_id, 1, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
    }

    fn cycling(layout_id: i64, key: &str) -> ScheduleItem {
        let mut item = item(layout_id);
        item.is_cycle_playback = true;
        item.cycle_group_key = key.to_string();
        item.cycle_play_count = 1;
        item
    }

    #[test]
    fn test_group_collapses_shared_key() {
        let flat = group_cycles(vec![cycling(1, "k"), cycling(2, "k"), item(3)]);

        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].layout_id, 1);
        assert_eq!(flat[1].layout_id, 3);

        let children = &flat[0].cycle_children;
        assert_eq!(children.len(), 3);
        assert!(children[0].is_cycle_sentinel());
        assert_eq!(children[1].layout_id, 1);
        assert_eq!(children[2].layout_id, 2);
        assert!(children[1..]
            .iter()
            .all(|c| c.cycle_group_key == flat[0].cycle_group_key));
    }

    #[test]
    fn test_distinct_keys_stay_separate() {
        let flat = group_cycles(vec![cycling(1, "a"), cycling(2, "b")]);

        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].cycle_children.len(), 2);
        assert_eq!(flat[1].cycle_children.len(), 2);
    }

    #[test]
    fn test_non_cycling_items_untouched() {
        let flat = group_cycles(vec![item(1), item(2)]);

        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|i| i.cycle_children.is_empty()));
    }

    #[test]
    fn test_overrides_never_group() {
        let mut a = cycling(1, "k");
        a.is_override = true;
        let mut b = cycling(2, "k");
        b.is_override = true;

        let flat = group_cycles(vec![a, b]);
        assert_eq!(flat.len(), 2, "override items pass through individually");
        assert!(flat.iter().all(|i| i.cycle_children.is_empty()));
    }

    #[test]
    fn test_input_order_preserved() {
        let flat = group_cycles(vec![item(9), cycling(1, "k"), item(8), cycling(2, "k")]);

        let ids: Vec<i64> = flat.iter().map(|i| i.layout_id).collect();
        assert_eq!(ids, vec![9, 1, 8]);
    }
}
