//! Heap snapshot model.
//!
//! A snapshot payload stores nodes and edges as flat integer arrays whose
//! layout is described by `snapshot.meta`. Edges carry no source field: the
//! Nth node owns the next `edge_count` edges, in node order.

use crate::{CdpError, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

const GC_ROOTS_NAME: &str = "(GC roots)";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Hidden,
    Array,
    String,
    Object,
    Code,
    Closure,
    RegExp,
    Number,
    Native,
    Synthetic,
    ConcatenatedString,
    SlicedString,
    Symbol,
    BigInt,
    ObjectShape,
    Other(String),
}

impl NodeType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "hidden" => Self::Hidden,
            "array" => Self::Array,
            "string" => Self::String,
            "object" => Self::Object,
            "code" => Self::Code,
            "closure" => Self::Closure,
            "regexp" => Self::RegExp,
            "number" => Self::Number,
            "native" => Self::Native,
            "synthetic" => Self::Synthetic,
            "concatenated string" => Self::ConcatenatedString,
            "sliced string" => Self::SlicedString,
            "symbol" => Self::Symbol,
            "bigint" => Self::BigInt,
            "object shape" => Self::ObjectShape,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Hidden => "hidden",
            Self::Array => "array",
            Self::String => "string",
            Self::Object => "object",
            Self::Code => "code",
            Self::Closure => "closure",
            Self::RegExp => "regexp",
            Self::Number => "number",
            Self::Native => "native",
            Self::Synthetic => "synthetic",
            Self::ConcatenatedString => "concatenated string",
            Self::SlicedString => "sliced string",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::ObjectShape => "object shape",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Context,
    Element,
    Property,
    Internal,
    Hidden,
    Shortcut,
    Weak,
    Other(String),
}

impl EdgeType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "context" => Self::Context,
            "element" => Self::Element,
            "property" => Self::Property,
            "internal" => Self::Internal,
            "hidden" => Self::Hidden,
            "shortcut" => Self::Shortcut,
            "weak" => Self::Weak,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Context => "context",
            Self::Element => "element",
            Self::Property => "property",
            Self::Internal => "internal",
            Self::Hidden => "hidden",
            Self::Shortcut => "shortcut",
            Self::Weak => "weak",
            Self::Other(name) => name,
        }
    }

    /// Property and internal edges name their slot through the string table;
    /// every other kind stores a plain index.
    fn has_string_name(&self) -> bool {
        matches!(self, Self::Property | Self::Internal)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EdgeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EdgeName {
    Name(String),
    Index(u64),
}

impl fmt::Display for EdgeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeapNode {
    pub id: u64,
    pub node_type: NodeType,
    pub name: String,
    pub self_size: u64,
    pub edge_count: usize,
    pub trace_node_id: u64,
}

impl HeapNode {
    pub fn is_gc_roots(&self) -> bool {
        self.node_type == NodeType::Synthetic && self.name == GC_ROOTS_NAME
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeapEdge {
    pub edge_type: EdgeType,
    pub name_or_index: EdgeName,
    /// Ordinal of the target node in [`HeapSnapshot::nodes`].
    pub to_node: usize,
}

/// One hop of a retaining path: `node` references the next hop through `edge`.
#[derive(Debug, Clone, Serialize)]
pub struct RetainingStep<'a> {
    pub node: &'a HeapNode,
    pub edge: &'a HeapEdge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSizeSummary {
    pub node_type: NodeType,
    pub count: usize,
    pub total_size: u64,
    pub avg_size: f64,
}

#[derive(Deserialize)]
struct RawSnapshot {
    snapshot: RawHeader,
    #[serde(default)]
    nodes: Vec<u64>,
    #[serde(default)]
    edges: Vec<u64>,
    #[serde(default)]
    strings: Vec<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    meta: RawMeta,
}

#[derive(Deserialize)]
struct RawMeta {
    node_fields: Vec<String>,
    node_types: Vec<Value>,
    edge_fields: Vec<String>,
    edge_types: Vec<Value>,
}

struct NodeLayout {
    width: usize,
    node_type: usize,
    name: usize,
    id: usize,
    self_size: usize,
    edge_count: usize,
    trace_node_id: Option<usize>,
}

struct EdgeLayout {
    width: usize,
    edge_type: usize,
    name_or_index: usize,
    to_node: usize,
}

#[derive(Debug, Clone)]
pub struct HeapSnapshot {
    nodes: Vec<HeapNode>,
    edges: Vec<HeapEdge>,
    strings: Vec<String>,
    /// Index of each node's first owned edge, parallel to `nodes`.
    first_edge: Vec<usize>,
    index_by_id: HashMap<u64, usize>,
    /// Target node id -> (source node id, edge index).
    retained_by: HashMap<u64, Vec<(u64, usize)>>,
}

impl HeapSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(text)
            .map_err(|e| CdpError::parse(format!("malformed heap snapshot: {e}")))?;
        Self::from_raw(raw)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_value(value)
            .map_err(|e| CdpError::parse(format!("malformed heap snapshot: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSnapshot) -> Result<Self> {
        let meta = &raw.snapshot.meta;
        let node_layout = NodeLayout {
            width: meta.node_fields.len(),
            node_type: field_index(&meta.node_fields, "type", "node_fields")?,
            name: field_index(&meta.node_fields, "name", "node_fields")?,
            id: field_index(&meta.node_fields, "id", "node_fields")?,
            self_size: field_index(&meta.node_fields, "self_size", "node_fields")?,
            edge_count: field_index(&meta.node_fields, "edge_count", "node_fields")?,
            trace_node_id: meta.node_fields.iter().position(|f| f == "trace_node_id"),
        };
        let edge_layout = EdgeLayout {
            width: meta.edge_fields.len(),
            edge_type: field_index(&meta.edge_fields, "type", "edge_fields")?,
            name_or_index: field_index(&meta.edge_fields, "name_or_index", "edge_fields")?,
            to_node: field_index(&meta.edge_fields, "to_node", "edge_fields")?,
        };
        let node_types: Vec<NodeType> = type_names(&meta.node_types, "node_types")?
            .iter()
            .map(|name| NodeType::from_name(name))
            .collect();
        let edge_types: Vec<EdgeType> = type_names(&meta.edge_types, "edge_types")?
            .iter()
            .map(|name| EdgeType::from_name(name))
            .collect();

        let nodes = parse_nodes(&raw.nodes, &node_layout, &node_types, &raw.strings)?;
        let edges = parse_edges(
            &raw.edges,
            &edge_layout,
            &edge_types,
            &raw.strings,
            node_layout.width,
            nodes.len(),
        )?;

        let mut index_by_id = HashMap::with_capacity(nodes.len());
        for (ordinal, node) in nodes.iter().enumerate() {
            if index_by_id.insert(node.id, ordinal).is_some() {
                return Err(CdpError::parse(format!("duplicate node id {}", node.id)));
            }
        }

        let mut first_edge = Vec::with_capacity(nodes.len());
        let mut consumed = 0usize;
        for node in &nodes {
            first_edge.push(consumed);
            consumed += node.edge_count;
        }
        if consumed != edges.len() {
            return Err(CdpError::parse(format!(
                "nodes declare {consumed} edges but the edge array holds {}",
                edges.len()
            )));
        }

        let mut retained_by: HashMap<u64, Vec<(u64, usize)>> = HashMap::new();
        for (ordinal, node) in nodes.iter().enumerate() {
            let start = first_edge[ordinal];
            for edge_index in start..start + node.edge_count {
                let target = &nodes[edges[edge_index].to_node];
                retained_by
                    .entry(target.id)
                    .or_default()
                    .push((node.id, edge_index));
            }
        }

        Ok(Self {
            nodes,
            edges,
            strings: raw.strings,
            first_edge,
            index_by_id,
            retained_by,
        })
    }

    pub fn nodes(&self) -> &[HeapNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[HeapEdge] {
        &self.edges
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn node(&self, id: u64) -> Option<&HeapNode> {
        self.index_by_id.get(&id).map(|&ordinal| &self.nodes[ordinal])
    }

    /// Outgoing edges of the node with the given id.
    pub fn edges_of(&self, id: u64) -> &[HeapEdge] {
        match self.index_by_id.get(&id) {
            Some(&ordinal) => {
                let start = self.first_edge[ordinal];
                &self.edges[start..start + self.nodes[ordinal].edge_count]
            }
            None => &[],
        }
    }

    /// Nodes referencing `id`, each with the edge it references through.
    pub fn retainers_of(&self, id: u64) -> Vec<RetainingStep<'_>> {
        self.retained_by
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&(source, edge)| {
                Some(RetainingStep {
                    node: self.node(source)?,
                    edge: &self.edges[edge],
                })
            })
            .collect()
    }

    pub fn nodes_by_type(&self, node_type: &NodeType) -> Vec<&HeapNode> {
        self.nodes
            .iter()
            .filter(|n| &n.node_type == node_type)
            .collect()
    }

    pub fn nodes_by_name(&self, name: &str) -> Vec<&HeapNode> {
        self.nodes.iter().filter(|n| n.name == name).collect()
    }

    /// Per-type totals, largest total size first.
    pub fn size_summary(&self) -> Vec<TypeSizeSummary> {
        let mut totals: HashMap<&NodeType, (usize, u64)> = HashMap::new();
        for node in &self.nodes {
            let entry = totals.entry(&node.node_type).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += node.self_size;
        }

        let mut summary: Vec<TypeSizeSummary> = totals
            .into_iter()
            .map(|(node_type, (count, total_size))| TypeSizeSummary {
                node_type: node_type.clone(),
                count,
                total_size,
                avg_size: total_size as f64 / count as f64,
            })
            .collect();
        summary.sort_by(|a, b| {
            b.total_size
                .cmp(&a.total_size)
                .then_with(|| a.node_type.as_str().cmp(b.node_type.as_str()))
        });
        summary
    }

    /// Nodes with a non-zero self size, largest first.
    pub fn largest_objects(&self, limit: usize) -> Vec<&HeapNode> {
        let mut nodes: Vec<&HeapNode> = self.nodes.iter().filter(|n| n.self_size > 0).collect();
        nodes.sort_by(|a, b| b.self_size.cmp(&a.self_size).then(a.id.cmp(&b.id)));
        nodes.truncate(limit);
        nodes
    }

    /// Shortest chain of references from `(GC roots)` to `node_id`, at most
    /// `max_depth` hops long. The first step is the root itself; the last
    /// step's edge points at the target. Empty when no root is reachable.
    pub fn find_retaining_path(&self, node_id: u64, max_depth: usize) -> Vec<RetainingStep<'_>> {
        if self.node(node_id).is_none() {
            return Vec::new();
        }

        // retainer id -> (node it retains, edge index)
        let mut came_from: HashMap<u64, (u64, usize)> = HashMap::new();
        let mut visited = HashSet::from([node_id]);
        let mut queue = VecDeque::from([(node_id, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if node.is_gc_roots() {
                return self.unwind_path(current, &came_from);
            }
            if depth >= max_depth {
                continue;
            }
            for &(retainer, edge) in self.retained_by.get(&current).into_iter().flatten() {
                if visited.insert(retainer) {
                    came_from.insert(retainer, (current, edge));
                    queue.push_back((retainer, depth + 1));
                }
            }
        }

        Vec::new()
    }

    fn unwind_path(&self, root: u64, came_from: &HashMap<u64, (u64, usize)>) -> Vec<RetainingStep<'_>> {
        let mut path = Vec::new();
        let mut current = root;
        while let Some(&(next, edge)) = came_from.get(&current) {
            if let Some(node) = self.node(current) {
                path.push(RetainingStep {
                    node,
                    edge: &self.edges[edge],
                });
            }
            current = next;
        }
        path
    }
}

fn field_index(fields: &[String], name: &str, block: &str) -> Result<usize> {
    fields
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| CdpError::parse(format!("snapshot.meta.{block} has no '{name}' field")))
}

fn type_names(types: &[Value], block: &str) -> Result<Vec<String>> {
    let names = types
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| CdpError::parse(format!("snapshot.meta.{block}[0] is not a type list")))?;
    names
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| CdpError::parse(format!("snapshot.meta.{block}[0] holds a non-string")))
        })
        .collect()
}

fn lookup<'a, T>(table: &'a [T], index: u64, what: &str) -> Result<&'a T> {
    usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i))
        .ok_or_else(|| CdpError::parse(format!("{what} index {index} out of range")))
}

fn check_width(len: usize, width: usize, what: &str) -> Result<()> {
    if width == 0 {
        return Err(CdpError::parse(format!("{what} layout has no fields")));
    }
    if len % width != 0 {
        return Err(CdpError::parse(format!(
            "{what} array length {len} is not a multiple of {width}"
        )));
    }
    Ok(())
}

fn parse_nodes(
    data: &[u64],
    layout: &NodeLayout,
    types: &[NodeType],
    strings: &[String],
) -> Result<Vec<HeapNode>> {
    check_width(data.len(), layout.width, "node")?;
    data.chunks_exact(layout.width)
        .map(|fields| {
            Ok(HeapNode {
                id: fields[layout.id],
                node_type: lookup(types, fields[layout.node_type], "node type")?.clone(),
                name: lookup(strings, fields[layout.name], "node name string")?.clone(),
                self_size: fields[layout.self_size],
                edge_count: usize::try_from(fields[layout.edge_count])
                    .map_err(|_| CdpError::parse("edge_count does not fit in memory"))?,
                trace_node_id: layout.trace_node_id.map_or(0, |i| fields[i]),
            })
        })
        .collect()
}

fn parse_edges(
    data: &[u64],
    layout: &EdgeLayout,
    types: &[EdgeType],
    strings: &[String],
    node_width: usize,
    node_count: usize,
) -> Result<Vec<HeapEdge>> {
    check_width(data.len(), layout.width, "edge")?;
    data.chunks_exact(layout.width)
        .map(|fields| {
            let edge_type = lookup(types, fields[layout.edge_type], "edge type")?.clone();
            let raw_name = fields[layout.name_or_index];
            let name_or_index = if edge_type.has_string_name() {
                EdgeName::Name(lookup(strings, raw_name, "edge name string")?.clone())
            } else {
                EdgeName::Index(raw_name)
            };

            // to_node is an offset into the flat node array, not an ordinal.
            let offset = usize::try_from(fields[layout.to_node]).unwrap_or(usize::MAX);
            if offset % node_width != 0 || offset / node_width >= node_count {
                return Err(CdpError::parse(format!(
                    "edge target offset {offset} does not address a node"
                )));
            }

            Ok(HeapEdge {
                edge_type,
                name_or_index,
                to_node: offset / node_width,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{heap_value, sample_heap_value};
    use serde_json::json;

    // Type indices into the sample enumeration.
    const OBJECT: u64 = 3;
    const SYNTHETIC: u64 = 9;
    const ELEMENT: u64 = 1;
    const PROPERTY: u64 = 2;

    #[test]
    fn test_parses_sample_snapshot() {
        let snapshot = HeapSnapshot::from_value(sample_heap_value()).unwrap();
        assert_eq!(snapshot.nodes().len(), 2);
        assert_eq!(snapshot.edges().len(), 1);
        assert_eq!(snapshot.strings().len(), 3);

        let roots = &snapshot.nodes()[0];
        assert_eq!(roots.node_type, NodeType::Synthetic);
        assert_eq!(roots.name, "(GC roots)");
        assert!(roots.is_gc_roots());

        let object = snapshot.node(2).unwrap();
        assert_eq!(object.node_type, NodeType::Object);
        assert_eq!(object.name, "Object");
        assert_eq!(object.self_size, 100);

        let edge = &snapshot.edges()[0];
        assert_eq!(edge.edge_type, EdgeType::Property);
        assert_eq!(edge.name_or_index, EdgeName::Name("myProperty".to_string()));
        assert_eq!(edge.to_node, 1);
    }

    #[test]
    fn test_node_count_and_id_index_match_payload() {
        let value = sample_heap_value();
        let field_count = value["snapshot"]["meta"]["node_fields"].as_array().unwrap().len();
        let raw_len = value["nodes"].as_array().unwrap().len();

        let snapshot = HeapSnapshot::from_value(value).unwrap();
        assert_eq!(snapshot.nodes().len(), raw_len / field_count);
        for node in snapshot.nodes() {
            assert_eq!(snapshot.node(node.id).map(|n| n.id), Some(node.id));
        }
    }

    #[test]
    fn test_edge_ownership_follows_node_order() {
        // root -> a (element 0), root -> b (element 1), a -> b (property "next")
        let value = heap_value(
            &[
                [SYNTHETIC, 0, 1, 0, 2],
                [OBJECT, 1, 10, 32, 1],
                [OBJECT, 1, 11, 48, 0],
            ],
            &[[ELEMENT, 0, 1], [ELEMENT, 1, 2], [PROPERTY, 2, 2]],
            &["(GC roots)", "Node", "next"],
        );
        let snapshot = HeapSnapshot::from_value(value).unwrap();

        let consumed: usize = snapshot.nodes().iter().map(|n| n.edge_count).sum();
        assert_eq!(consumed, snapshot.edges().len());

        assert_eq!(snapshot.edges_of(1).len(), 2);
        assert_eq!(snapshot.edges_of(1)[1].name_or_index, EdgeName::Index(1));
        assert_eq!(snapshot.edges_of(10).len(), 1);
        assert_eq!(
            snapshot.edges_of(10)[0].name_or_index,
            EdgeName::Name("next".to_string())
        );
        assert!(snapshot.edges_of(11).is_empty());
        assert!(snapshot.edges_of(999).is_empty());

        let mut retainers: Vec<u64> = snapshot.retainers_of(11).iter().map(|s| s.node.id).collect();
        retainers.sort_unstable();
        assert_eq!(retainers, vec![1, 10]);
    }

    #[test]
    fn test_field_order_comes_from_metadata() {
        let mut value = sample_heap_value();
        value["snapshot"]["meta"]["node_fields"] =
            json!(["id", "self_size", "type", "name", "trace_node_id", "edge_count"]);
        value["nodes"] = json!([
            1, 0, 9, 0, 0, 1,
            2, 100, 3, 1, 0, 0
        ]);
        value["snapshot"]["meta"]["edge_fields"] = json!(["to_node", "type", "name_or_index"]);
        value["edges"] = json!([6, 2, 2]);

        let snapshot = HeapSnapshot::from_value(value).unwrap();
        assert!(snapshot.node(1).unwrap().is_gc_roots());
        assert_eq!(snapshot.node(2).unwrap().self_size, 100);
        assert_eq!(snapshot.find_retaining_path(2, 5).len(), 1);
    }

    #[test]
    fn test_trace_node_id_is_optional() {
        let mut value = sample_heap_value();
        value["snapshot"]["meta"]["node_fields"] =
            json!(["type", "name", "id", "self_size", "edge_count"]);
        value["nodes"] = json!([9, 0, 1, 0, 1, 3, 1, 2, 100, 0]);
        value["edges"] = json!([2, 2, 5]);

        let snapshot = HeapSnapshot::from_value(value).unwrap();
        assert_eq!(snapshot.node(2).unwrap().trace_node_id, 0);
    }

    #[test]
    fn test_filters() {
        let snapshot = HeapSnapshot::from_value(sample_heap_value()).unwrap();

        let objects = snapshot.nodes_by_type(&NodeType::Object);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "Object");
        assert_eq!(snapshot.nodes_by_type(&NodeType::Synthetic).len(), 1);
        assert!(snapshot.nodes_by_type(&NodeType::Closure).is_empty());

        let named = snapshot.nodes_by_name("Object");
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].self_size, 100);
    }

    #[test]
    fn test_size_summary_orders_by_total_size() {
        let value = heap_value(
            &[
                [SYNTHETIC, 0, 1, 0, 0],
                [OBJECT, 1, 2, 100, 0],
                [OBJECT, 1, 3, 60, 0],
                [2, 2, 4, 120, 0],
            ],
            &[],
            &["(GC roots)", "Object", "hello"],
        );
        let summary = HeapSnapshot::from_value(value).unwrap().size_summary();

        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].node_type, NodeType::Object);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].total_size, 160);
        assert!((summary[0].avg_size - 80.0).abs() < f64::EPSILON);
        assert_eq!(summary[1].node_type, NodeType::String);
        assert_eq!(summary[2].node_type, NodeType::Synthetic);
        assert_eq!(summary[2].total_size, 0);
    }

    #[test]
    fn test_largest_objects_skips_zero_sized_nodes() {
        let snapshot = HeapSnapshot::from_value(sample_heap_value()).unwrap();
        let largest = snapshot.largest_objects(10);
        assert_eq!(largest.len(), 1);
        assert_eq!(largest[0].name, "Object");
        assert_eq!(largest[0].self_size, 100);
    }

    #[test]
    fn test_retaining_path_one_hop_from_roots() {
        let snapshot = HeapSnapshot::from_value(sample_heap_value()).unwrap();
        let path = snapshot.find_retaining_path(2, 10);
        assert_eq!(path.len(), 1);
        assert!(path[0].node.is_gc_roots());
        assert_eq!(
            path[0].edge.name_or_index,
            EdgeName::Name("myProperty".to_string())
        );
    }

    #[test]
    fn test_retaining_path_for_isolated_node_is_empty() {
        let value = heap_value(
            &[[SYNTHETIC, 0, 1, 0, 1], [OBJECT, 1, 2, 100, 0], [OBJECT, 1, 3, 8, 0]],
            &[[PROPERTY, 2, 1]],
            &["(GC roots)", "Object", "held"],
        );
        let snapshot = HeapSnapshot::from_value(value).unwrap();
        assert!(snapshot.find_retaining_path(3, 10).is_empty());
        assert!(snapshot.find_retaining_path(404, 10).is_empty());
        assert!(snapshot.find_retaining_path(1, 10).is_empty());
    }

    #[test]
    fn test_retaining_path_is_shortest_and_survives_cycles() {
        // roots -> a -> b -> c, a <-> b cycle, roots -> c shortcut via d
        //   ordinals: 0 roots, 1 a, 2 b, 3 c, 4 d
        let value = heap_value(
            &[
                [SYNTHETIC, 0, 1, 0, 2],
                [OBJECT, 1, 10, 16, 1],
                [OBJECT, 1, 20, 16, 2],
                [OBJECT, 1, 30, 16, 0],
                [OBJECT, 1, 40, 16, 1],
            ],
            &[
                [PROPERTY, 2, 1],
                [PROPERTY, 2, 4],
                [PROPERTY, 2, 2],
                [PROPERTY, 2, 1],
                [PROPERTY, 2, 3],
                [PROPERTY, 2, 3],
            ],
            &["(GC roots)", "Thing", "ref"],
        );
        let snapshot = HeapSnapshot::from_value(value).unwrap();

        let path = snapshot.find_retaining_path(30, 10);
        let hops: Vec<u64> = path.iter().map(|s| s.node.id).collect();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0], 1);
        assert!(hops[1] == 20 || hops[1] == 40);
        assert_eq!(snapshot.nodes()[path[1].edge.to_node].id, 30);

        let to_b = snapshot.find_retaining_path(20, 10);
        let hops: Vec<u64> = to_b.iter().map(|s| s.node.id).collect();
        assert_eq!(hops, vec![1, 10]);

        assert!(snapshot.find_retaining_path(20, 1).is_empty());
        assert_eq!(snapshot.find_retaining_path(20, 2).len(), 2);
    }

    #[test]
    fn test_missing_metadata_field_is_parse_error() {
        let mut value = sample_heap_value();
        value["snapshot"]["meta"]["node_fields"] = json!(["type", "name", "self_size", "edge_count"]);
        let err = HeapSnapshot::from_value(value).unwrap_err();
        assert!(matches!(&err, CdpError::Parse(msg) if msg.contains("'id'")), "{err}");

        let mut value = sample_heap_value();
        value["snapshot"]["meta"]
            .as_object_mut()
            .unwrap()
            .remove("edge_types");
        assert!(matches!(
            HeapSnapshot::from_value(value),
            Err(CdpError::Parse(_))
        ));

        assert!(matches!(
            HeapSnapshot::from_json_str("{\"nodes\": []}"),
            Err(CdpError::Parse(_))
        ));
    }

    #[test]
    fn test_inconsistent_arrays_are_parse_errors() {
        let mut truncated = sample_heap_value();
        truncated["nodes"].as_array_mut().unwrap().pop();
        assert!(matches!(
            HeapSnapshot::from_value(truncated),
            Err(CdpError::Parse(_))
        ));

        let mut extra_edge = sample_heap_value();
        extra_edge["edges"] = json!([2, 2, 6, 1, 0, 0]);
        assert!(matches!(
            HeapSnapshot::from_value(extra_edge),
            Err(CdpError::Parse(msg)) if msg.contains("declare 1 edges")
        ));

        let mut dangling = sample_heap_value();
        dangling["edges"] = json!([2, 2, 12]);
        assert!(matches!(
            HeapSnapshot::from_value(dangling),
            Err(CdpError::Parse(_))
        ));

        let mut bad_type = sample_heap_value();
        bad_type["nodes"][0] = json!(42);
        assert!(matches!(
            HeapSnapshot::from_value(bad_type),
            Err(CdpError::Parse(_))
        ));

        let mut duplicate = sample_heap_value();
        duplicate["nodes"][8] = json!(1);
        assert!(matches!(
            HeapSnapshot::from_value(duplicate),
            Err(CdpError::Parse(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_unknown_type_names_are_kept() {
        let mut value = sample_heap_value();
        value["snapshot"]["meta"]["node_types"][0][3] = json!("wasm object");
        let snapshot = HeapSnapshot::from_value(value).unwrap();
        assert_eq!(
            snapshot.node(2).unwrap().node_type,
            NodeType::Other("wasm object".to_string())
        );
        assert_eq!(snapshot.node(2).unwrap().node_type.to_string(), "wasm object");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "inspector_bridge_core_heap_{}.heapsnapshot",
            std::process::id()
        ));
        std::fs::write(&path, sample_heap_value().to_string()).unwrap();
        let snapshot = HeapSnapshot::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(snapshot.nodes().len(), 2);

        assert!(matches!(
            HeapSnapshot::load(path.with_extension("missing")),
            Err(CdpError::Io(_))
        ));
    }
}
