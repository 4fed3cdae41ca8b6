//! Snapshot diffing and growth-trend detection.

use crate::heap::{HeapSnapshot, NodeType};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

type GroupKey = (NodeType, String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDelta {
    pub node_type: NodeType,
    pub name: String,
    pub count_before: u64,
    pub count_after: u64,
    pub count_delta: i64,
    pub size_before: u64,
    pub size_after: u64,
    pub size_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakCandidate {
    pub node_type: NodeType,
    pub name: String,
    pub total_growth_bytes: u64,
    pub growth_per_step: f64,
    pub steps_growing: usize,
}

#[derive(Default, Clone, Copy)]
struct GroupTotals {
    count: u64,
    size: u64,
}

fn summarize(snapshot: &HeapSnapshot) -> HashMap<GroupKey, GroupTotals> {
    let mut groups: HashMap<GroupKey, GroupTotals> = HashMap::new();
    for node in snapshot.nodes() {
        let totals = groups
            .entry((node.node_type.clone(), node.name.clone()))
            .or_default();
        totals.count += 1;
        totals.size += node.self_size;
    }
    groups
}

fn signed_delta(before: u64, after: u64) -> i64 {
    (i128::from(after) - i128::from(before)).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn all_deltas(before: &HeapSnapshot, after: &HeapSnapshot) -> Vec<GroupDelta> {
    let before = summarize(before);
    let after = summarize(after);
    let keys: HashSet<&GroupKey> = before.keys().chain(after.keys()).collect();

    keys.into_iter()
        .map(|key| {
            let b = before.get(key).copied().unwrap_or_default();
            let a = after.get(key).copied().unwrap_or_default();
            GroupDelta {
                node_type: key.0.clone(),
                name: key.1.clone(),
                count_before: b.count,
                count_after: a.count,
                count_delta: signed_delta(b.count, a.count),
                size_before: b.size,
                size_after: a.size,
                size_delta: signed_delta(b.size, a.size),
            }
        })
        .collect()
}

/// Groups that grew in count or size between `before` and `after`,
/// largest size growth first.
pub fn compare(before: &HeapSnapshot, after: &HeapSnapshot) -> Vec<GroupDelta> {
    let mut rows: Vec<GroupDelta> = all_deltas(before, after)
        .into_iter()
        .filter(|row| row.count_delta > 0 || row.size_delta > 0)
        .collect();
    rows.sort_by(|a, b| {
        b.size_delta
            .cmp(&a.size_delta)
            .then_with(|| a.node_type.as_str().cmp(b.node_type.as_str()))
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// Groups whose total size strictly grew across every consecutive pair of
/// `series` and whose summed growth exceeds `threshold_bytes`.
pub fn detect_leaks(series: &[HeapSnapshot], threshold_bytes: u64) -> Vec<LeakCandidate> {
    if series.len() < 2 {
        return Vec::new();
    }
    let steps = series.len() - 1;

    let mut trends: HashMap<GroupKey, Vec<i64>> = HashMap::new();
    for pair in series.windows(2) {
        for row in all_deltas(&pair[0], &pair[1]) {
            trends
                .entry((row.node_type, row.name))
                .or_default()
                .push(row.size_delta);
        }
    }

    let mut leaks: Vec<LeakCandidate> = trends
        .into_iter()
        .filter(|(_, deltas)| deltas.len() == steps && deltas.iter().all(|&d| d > 0))
        .filter_map(|((node_type, name), deltas)| {
            let total: u64 = deltas.iter().map(|&d| d.unsigned_abs()).sum();
            (total > threshold_bytes).then(|| LeakCandidate {
                node_type,
                name,
                total_growth_bytes: total,
                growth_per_step: total as f64 / steps as f64,
                steps_growing: steps,
            })
        })
        .collect();
    leaks.sort_by(|a, b| {
        b.total_growth_bytes
            .cmp(&a.total_growth_bytes)
            .then_with(|| a.node_type.as_str().cmp(b.node_type.as_str()))
            .then_with(|| a.name.cmp(&b.name))
    });

    if !leaks.is_empty() {
        tracing::debug!("{} leak candidates across {} snapshots", leaks.len(), series.len());
    }
    leaks
}
