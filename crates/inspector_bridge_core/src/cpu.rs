//! CPU profile model.
//!
//! Profiles arrive as a call tree (nodes listing their children) plus a flat,
//! chronological sequence of sampled node ids.

use crate::{CdpError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const PROMISE_THRESHOLD_PCT: f64 = 20.0;
const AWAIT_THRESHOLD_PCT: f64 = 15.0;
const CALLBACK_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileNode {
    pub id: u64,
    pub function_name: String,
    pub script_id: String,
    pub url: String,
    pub line_number: i64,
    pub column_number: i64,
    /// Leaf samples as reported by the runtime.
    pub hit_count: u64,
    pub children: Vec<u64>,
    pub bailout_reason: Option<String>,
    pub deopt_reason: Option<String>,
}

impl ProfileNode {
    pub fn display_name(&self) -> &str {
        if self.function_name.is_empty() {
            "(anonymous)"
        } else {
            &self.function_name
        }
    }

    fn optimization_notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if let Some(reason) = &self.bailout_reason {
            notes.push(format!("Bailout: {reason}"));
        }
        if let Some(reason) = &self.deopt_reason {
            notes.push(format!("Deopt: {reason}"));
        }
        notes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotFunction {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_samples: u64,
    pub total_samples: u64,
    pub self_pct: f64,
    pub total_pct: f64,
    pub bailout_reason: Option<String>,
    pub deopt_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallTreeNode {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_samples: u64,
    pub total_samples: u64,
    pub children: Vec<CallTreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotPath {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub pct: f64,
    pub samples: u64,
    /// `name:line` frames from the first non-root caller down to this node.
    pub call_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationIssue {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_samples: u64,
    pub total_samples: u64,
    pub issues: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTime {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_pct: f64,
    pub total_pct: f64,
    pub self_samples: u64,
    pub total_samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncOverhead {
    pub promise_pct: f64,
    pub await_pct: f64,
    pub callback_pct: f64,
    pub promise_nodes: usize,
    pub await_nodes: usize,
    pub callback_nodes: usize,
    pub analysis: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSummary {
    pub total_time_ms: f64,
    pub total_time_s: f64,
    pub sample_count: usize,
    pub sample_rate_hz: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    nodes: Vec<RawNode>,
    #[serde(default)]
    samples: Vec<u64>,
    #[serde(default)]
    time_deltas: Vec<i64>,
    #[serde(default)]
    start_time: f64,
    #[serde(default)]
    end_time: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: u64,
    call_frame: RawCallFrame,
    #[serde(default)]
    hit_count: u64,
    #[serde(default)]
    children: Vec<u64>,
    bailout_reason: Option<String>,
    deopt_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCallFrame {
    #[serde(default)]
    function_name: String,
    #[serde(default)]
    script_id: ScriptId,
    #[serde(default)]
    url: String,
    #[serde(default)]
    line_number: i64,
    #[serde(default)]
    column_number: i64,
}

/// Runtimes disagree on whether script ids are strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptId {
    Text(String),
    Number(i64),
}

impl Default for ScriptId {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<ScriptId> for String {
    fn from(id: ScriptId) -> Self {
        match id {
            ScriptId::Text(text) => text,
            ScriptId::Number(n) => n.to_string(),
        }
    }
}

fn non_empty(reason: Option<String>) -> Option<String> {
    reason.filter(|r| !r.is_empty())
}

#[derive(Debug, Clone)]
pub struct CpuProfile {
    nodes: Vec<ProfileNode>,
    samples: Vec<u64>,
    time_deltas: Vec<i64>,
    start_time: f64,
    end_time: f64,
    index_by_id: HashMap<u64, usize>,
    parent_of: HashMap<u64, u64>,
    self_samples: HashMap<u64, u64>,
    inclusive_samples: HashMap<u64, u64>,
}

impl CpuProfile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawProfile = serde_json::from_str(text)
            .map_err(|e| CdpError::parse(format!("malformed CPU profile: {e}")))?;
        Self::from_raw(raw)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawProfile = serde_json::from_value(value)
            .map_err(|e| CdpError::parse(format!("malformed CPU profile: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawProfile) -> Result<Self> {
        let nodes: Vec<ProfileNode> = raw
            .nodes
            .into_iter()
            .map(|node| ProfileNode {
                id: node.id,
                function_name: node.call_frame.function_name,
                script_id: node.call_frame.script_id.into(),
                url: node.call_frame.url,
                line_number: node.call_frame.line_number,
                column_number: node.call_frame.column_number,
                hit_count: node.hit_count,
                children: node.children,
                bailout_reason: non_empty(node.bailout_reason),
                deopt_reason: non_empty(node.deopt_reason),
            })
            .collect();

        let mut index_by_id = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index_by_id.insert(node.id, i).is_some() {
                return Err(CdpError::parse(format!("duplicate profile node id {}", node.id)));
            }
        }

        let mut parent_of = HashMap::new();
        for node in &nodes {
            for &child in &node.children {
                if !index_by_id.contains_key(&child) {
                    return Err(CdpError::parse(format!(
                        "node {} lists unknown child {child}",
                        node.id
                    )));
                }
                parent_of.insert(child, node.id);
            }
        }

        let mut self_samples: HashMap<u64, u64> = HashMap::new();
        for &sample in &raw.samples {
            if !index_by_id.contains_key(&sample) {
                return Err(CdpError::parse(format!(
                    "sample references unknown node id {sample}"
                )));
            }
            *self_samples.entry(sample).or_default() += 1;
        }

        let mut profile = Self {
            nodes,
            samples: raw.samples,
            time_deltas: raw.time_deltas,
            start_time: raw.start_time,
            end_time: raw.end_time,
            index_by_id,
            parent_of,
            self_samples,
            inclusive_samples: HashMap::new(),
        };
        profile.inclusive_samples = match profile.forest_totals() {
            Some(totals) => totals,
            None => {
                tracing::debug!("CPU profile call graph is not a tree; counting per node");
                profile
                    .nodes
                    .iter()
                    .map(|node| (node.id, profile.count_reachable_samples(node.id)))
                    .collect()
            }
        };
        Ok(profile)
    }

    /// Inclusive samples in one post-order pass. `None` when some node is
    /// listed twice, sits on a cycle, or is unreachable from a root.
    fn forest_totals(&self) -> Option<HashMap<u64, u64>> {
        let mut totals = HashMap::with_capacity(self.nodes.len());
        let mut visited = HashSet::with_capacity(self.nodes.len());
        let mut stack = Vec::new();

        for root in self.nodes.iter().filter(|n| !self.parent_of.contains_key(&n.id)) {
            visited.insert(root.id);
            stack.push((root.id, false));
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    let below: u64 = self
                        .children_of(id)
                        .iter()
                        .map(|c| totals.get(c).copied().unwrap_or(0))
                        .sum();
                    totals.insert(id, self.self_samples(id) + below);
                    continue;
                }
                stack.push((id, true));
                for &child in self.children_of(id) {
                    if !visited.insert(child) {
                        return None;
                    }
                    stack.push((child, false));
                }
            }
        }

        (visited.len() == self.nodes.len()).then_some(totals)
    }

    /// Self samples of `id` and everything below it. A node reached twice
    /// (malformed or cyclic children lists) only counts once.
    fn count_reachable_samples(&self, id: u64) -> u64 {
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        let mut total = 0;
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            total += self.self_samples(current);
            stack.extend(self.children_of(current).iter().copied());
        }
        total
    }

    pub fn nodes(&self) -> &[ProfileNode] {
        &self.nodes
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    pub fn time_deltas(&self) -> &[i64] {
        &self.time_deltas
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn total_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn node(&self, id: u64) -> Option<&ProfileNode> {
        self.index_by_id.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn parent_of(&self, id: u64) -> Option<u64> {
        self.parent_of.get(&id).copied()
    }

    pub fn children_of(&self, id: u64) -> &[u64] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Occurrences of `id` in the sample sequence.
    pub fn self_samples(&self, id: u64) -> u64 {
        self.self_samples.get(&id).copied().unwrap_or(0)
    }

    pub fn inclusive_samples(&self, id: u64) -> u64 {
        self.inclusive_samples.get(&id).copied().unwrap_or(0)
    }

    /// First node that no other node lists as a child.
    pub fn root(&self) -> Option<&ProfileNode> {
        self.nodes.iter().find(|n| !self.parent_of.contains_key(&n.id))
    }

    fn pct(&self, samples: u64) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            samples as f64 / self.samples.len() as f64 * 100.0
        }
    }

    /// Sampled functions ranked by inclusive samples, then self samples, then
    /// id. Root nodes are excluded since they trivially hold every sample.
    pub fn hot_functions(&self, limit: usize) -> Vec<HotFunction> {
        let mut rows: Vec<HotFunction> = self
            .nodes
            .iter()
            .filter(|n| self.parent_of.contains_key(&n.id))
            .filter(|n| self.inclusive_samples(n.id) > 0)
            .map(|n| {
                let self_samples = self.self_samples(n.id);
                let total_samples = self.inclusive_samples(n.id);
                HotFunction {
                    id: n.id,
                    function_name: n.display_name().to_string(),
                    url: n.url.clone(),
                    line: n.line_number,
                    self_samples,
                    total_samples,
                    self_pct: self.pct(self_samples),
                    total_pct: self.pct(total_samples),
                    bailout_reason: n.bailout_reason.clone(),
                    deopt_reason: n.deopt_reason.clone(),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_samples
                .cmp(&a.total_samples)
                .then(b.self_samples.cmp(&a.self_samples))
                .then(a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        rows
    }

    /// Nested tree below `root` (the profile root when `None`); nodes deeper
    /// than `max_depth` are left out. Each node appears at most once, under
    /// the first parent that reaches it.
    pub fn call_tree(&self, root: Option<u64>, max_depth: usize) -> Option<CallTreeNode> {
        let root = match root {
            Some(id) => id,
            None => self.root()?.id,
        };
        self.node(root)?;

        // Pre-order walk: every parent lands in `order` before its children.
        let mut order: Vec<(u64, Option<usize>)> = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, None, 0)];
        while let Some((id, parent, depth)) = stack.pop() {
            if depth > max_depth || !visited.insert(id) {
                continue;
            }
            let slot = order.len();
            order.push((id, parent));
            for &child in self.children_of(id).iter().rev() {
                stack.push((child, Some(slot), depth + 1));
            }
        }

        let mut built: Vec<Option<CallTreeNode>> =
            order.iter().map(|&(id, _)| self.tree_node(id)).collect();
        for slot in (1..order.len()).rev() {
            let Some(mut node) = built[slot].take() else {
                continue;
            };
            // Children were attached last-first.
            node.children.reverse();
            if let Some(parent) = order[slot].1.and_then(|p| built[p].as_mut()) {
                parent.children.push(node);
            }
        }
        let mut tree = built.into_iter().next().flatten()?;
        tree.children.reverse();
        Some(tree)
    }

    fn tree_node(&self, id: u64) -> Option<CallTreeNode> {
        let node = self.node(id)?;
        Some(CallTreeNode {
            id,
            function_name: node.display_name().to_string(),
            url: node.url.clone(),
            line: node.line_number,
            self_samples: self.self_samples(id),
            total_samples: self.inclusive_samples(id),
            children: Vec::new(),
        })
    }

    /// Every node holding at least `min_pct` percent of samples, hottest first.
    pub fn hot_paths(&self, min_pct: f64) -> Vec<HotPath> {
        let mut rows: Vec<HotPath> = self
            .nodes
            .iter()
            .filter_map(|n| {
                let samples = self.inclusive_samples(n.id);
                let pct = self.pct(samples);
                if pct < min_pct {
                    return None;
                }
                let frames = self.caller_frames(n.id);
                Some(HotPath {
                    id: n.id,
                    function_name: n.display_name().to_string(),
                    url: n.url.clone(),
                    line: n.line_number,
                    pct,
                    samples,
                    call_path: if frames.is_empty() {
                        n.function_name.clone()
                    } else {
                        frames.join(" -> ")
                    },
                })
            })
            .collect();
        rows.sort_by(|a, b| b.pct.total_cmp(&a.pct).then(a.id.cmp(&b.id)));
        rows
    }

    /// `name:line` for `id` and each ancestor that itself has a parent, outermost first.
    fn caller_frames(&self, id: u64) -> Vec<String> {
        let mut frames = Vec::new();
        let mut seen = HashSet::new();
        let mut current = id;
        while let Some(&parent) = self.parent_of.get(&current) {
            if !seen.insert(current) {
                break;
            }
            if let Some(node) = self.node(current) {
                frames.push(format!("{}:{}", node.function_name, node.line_number));
            }
            current = parent;
        }
        frames.reverse();
        frames
    }

    /// Nodes carrying bailout or deopt reasons, most samples first.
    pub fn optimization_issues(&self) -> Vec<OptimizationIssue> {
        let mut rows: Vec<OptimizationIssue> = self
            .nodes
            .iter()
            .filter_map(|n| {
                let notes = n.optimization_notes();
                if notes.is_empty() {
                    return None;
                }
                Some(OptimizationIssue {
                    id: n.id,
                    function_name: n.display_name().to_string(),
                    url: n.url.clone(),
                    line: n.line_number,
                    self_samples: self.self_samples(n.id),
                    total_samples: self.inclusive_samples(n.id),
                    issues: notes.join("; "),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.total_samples.cmp(&a.total_samples).then(a.id.cmp(&b.id)));
        rows
    }

    /// Per-function share of samples, optionally limited to urls containing `url_filter`.
    pub fn function_times(&self, url_filter: Option<&str>) -> Vec<FunctionTime> {
        let mut rows: Vec<FunctionTime> = self
            .nodes
            .iter()
            .filter(|n| url_filter.map_or(true, |filter| n.url.contains(filter)))
            .filter(|n| self.inclusive_samples(n.id) > 0)
            .map(|n| {
                let self_samples = self.self_samples(n.id);
                let total_samples = self.inclusive_samples(n.id);
                FunctionTime {
                    id: n.id,
                    function_name: n.display_name().to_string(),
                    url: n.url.clone(),
                    line: n.line_number,
                    self_pct: self.pct(self_samples),
                    total_pct: self.pct(total_samples),
                    self_samples,
                    total_samples,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.total_samples.cmp(&a.total_samples).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn async_overhead(&self) -> AsyncOverhead {
        let promise: Vec<&ProfileNode> = self
            .nodes
            .iter()
            .filter(|n| n.function_name.contains("Promise") || n.url.to_lowercase().contains("async"))
            .collect();
        let awaiting: Vec<&ProfileNode> = self
            .nodes
            .iter()
            .filter(|n| n.function_name.to_lowercase().contains("await"))
            .collect();
        let callback: Vec<&ProfileNode> = self
            .nodes
            .iter()
            .filter(|n| n.function_name.to_lowercase().contains("callback"))
            .collect();

        let share = |nodes: &[&ProfileNode]| {
            self.pct(nodes.iter().map(|n| self.inclusive_samples(n.id)).sum())
        };
        let promise_pct = share(&promise);
        let await_pct = share(&awaiting);
        let callback_pct = share(&callback);

        let mut notes = Vec::new();
        if promise_pct > PROMISE_THRESHOLD_PCT {
            notes.push(format!(
                "High Promise overhead ({promise_pct:.1}% of time), consider reducing async operations"
            ));
        }
        if await_pct > AWAIT_THRESHOLD_PCT {
            notes.push(format!(
                "Significant time in await ({await_pct:.1}%), check for blocking async operations"
            ));
        }
        if callback_pct > CALLBACK_THRESHOLD_PCT {
            notes.push(format!(
                "Callback overhead detected ({callback_pct:.1}%), consider using async/await"
            ));
        }
        let analysis = if notes.is_empty() {
            "No significant async performance issues detected".to_string()
        } else {
            notes.join("; ")
        };

        AsyncOverhead {
            promise_pct,
            await_pct,
            callback_pct,
            promise_nodes: promise.len(),
            await_nodes: awaiting.len(),
            callback_nodes: callback.len(),
            analysis,
        }
    }

    /// Timestamps are microseconds.
    pub fn timing_summary(&self) -> TimingSummary {
        let total_time_ms = (self.end_time - self.start_time) / 1000.0;
        let total_time_s = total_time_ms / 1000.0;
        let sample_count = self.samples.len();
        TimingSummary {
            total_time_ms,
            total_time_s,
            sample_count,
            sample_rate_hz: if total_time_s > 0.0 {
                sample_count as f64 / total_time_s
            } else {
                0.0
            },
        }
    }
}
