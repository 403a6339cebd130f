//! # Graph - block reference graph
//!
//! [`build_graph`] turns the corpus into a [`BlockGraph`]: one node per block that takes part in
//! at least one reference, one edge per distinct `(from, key, to)` triple. Targets that are not
//! defined anywhere in the corpus are kept as orphan nodes so dangling references stay visible.

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::{depth_first_search, Control, DfsEvent},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::{codec, error::BlockPropsError, properties::Property, store::DocumentStore};

/// Presentation state derived from a block's `status` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Done,
    Blocked,
    Active,
    Todo,
}

impl NodeStatus {
    /// Case-insensitive mapping of common status values; `None` for anything else.
    pub fn from_value(value: &str) -> Option<NodeStatus> {
        match value.trim().to_lowercase().as_str() {
            "done" | "complete" | "completed" => Some(NodeStatus::Done),
            "blocked" | "failed" => Some(NodeStatus::Blocked),
            "in-progress" | "active" | "doing" => Some(NodeStatus::Active),
            "todo" | "pending" => Some(NodeStatus::Todo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// Document defining the block; `None` for orphans.
    pub source_path: Option<String>,
    pub line: Option<usize>,
    pub properties: Vec<Property>,
    pub is_orphan: bool,
}

impl GraphNode {
    fn orphan(id: &str) -> Self {
        GraphNode {
            id: id.to_string(),
            source_path: None,
            line: None,
            properties: Vec::new(),
            is_orphan: true,
        }
    }

    pub fn status(&self) -> Option<NodeStatus> {
        self.properties
            .iter()
            .find(|p| p.key == "status")
            .and_then(|p| NodeStatus::from_value(&p.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// `<from>:<key>:<to>`. Neither block ids nor keys can contain `:`.
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: String,
}

impl GraphEdge {
    fn new(from: &str, key: &str, to: &str) -> Self {
        GraphEdge {
            id: format!("{from}:{key}:{to}"),
            from: from.to_string(),
            to: to.to_string(),
            label: key.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl BlockGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn orphans(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.is_orphan)
    }

    fn as_digraph(&self) -> (DiGraph<&str, &str>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for node in &self.nodes {
            indices.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
        }
        for edge in &self.edges {
            if let (Some(from), Some(to)) =
                (indices.get(edge.from.as_str()), indices.get(edge.to.as_str()))
            {
                graph.add_edge(*from, *to, edge.label.as_str());
            }
        }
        (graph, indices)
    }

    /// Every node reachable from `id` along edge direction, in depth-first discovery order, not
    /// including `id` itself. Cycles are followed once.
    pub fn reachable_from(&self, id: &str) -> Vec<String> {
        let (graph, indices) = self.as_digraph();
        let Some(start) = indices.get(id).copied() else {
            return Vec::new();
        };
        let mut reached = Vec::new();
        depth_first_search(&graph, Some(start), |event| {
            if let DfsEvent::Discover(node, _) = event {
                if node != start {
                    reached.push(graph[node].to_string());
                }
            }
            Control::<()>::Continue
        });
        reached
    }
}

struct RecordedBlock {
    id: String,
    path: String,
    line: usize,
    properties: Vec<Property>,
}

impl RecordedBlock {
    fn bare(id: &str, path: &str, line: usize) -> Self {
        RecordedBlock {
            id: id.to_string(),
            path: path.to_string(),
            line,
            properties: Vec::new(),
        }
    }

    fn node(&self) -> GraphNode {
        GraphNode {
            id: self.id.clone(),
            source_path: Some(self.path.clone()),
            line: Some(self.line),
            properties: self.properties.clone(),
            is_orphan: false,
        }
    }
}

/// Builds the reference graph of the whole corpus.
///
/// Blocks are recorded on first occurrence in listing order; a later block reusing an id is
/// ignored. A bare `^id` marker only stands in for a target no property list defines, so such
/// targets are not orphans. Unreadable documents are skipped.
#[tracing::instrument(skip_all)]
pub async fn build_graph<S: DocumentStore>(store: &S) -> Result<BlockGraph, BlockPropsError> {
    let mut recorded: Vec<RecordedBlock> = Vec::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    let mut bare: HashMap<String, RecordedBlock> = HashMap::new();
    for path in store.list_documents().await? {
        let content = match store.read(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Skipping {} while building graph: {}", path, e);
                continue;
            }
        };
        for (line, text) in content.split('\n').enumerate() {
            for (id, _) in codec::bare_markers(text) {
                if !bare.contains_key(&id) {
                    let block = RecordedBlock::bare(&id, &path, line);
                    bare.insert(id, block);
                }
            }
        }
        for line in codec::lines(&content) {
            for block in line.blocks {
                if lookup.contains_key(&block.block_id) {
                    continue;
                }
                lookup.insert(block.block_id.clone(), recorded.len());
                recorded.push(RecordedBlock {
                    id: block.block_id,
                    path: path.clone(),
                    line: line.line,
                    properties: block.properties,
                });
            }
        }
    }

    let mut graph = BlockGraph::default();
    let mut node_ids: BTreeSet<String> = BTreeSet::new();
    let mut edge_keys: BTreeSet<(&str, &str, &str)> = BTreeSet::new();
    for block in &recorded {
        for property in &block.properties {
            for target in property.parsed.block_refs() {
                let triple = (&*block.id, &*property.key, &*target.target);
                if edge_keys.insert(triple) {
                    graph
                        .edges
                        .push(GraphEdge::new(&block.id, &property.key, &target.target));
                }
                if node_ids.insert(block.id.clone()) {
                    graph.nodes.push(block.node());
                }
                if node_ids.insert(target.target.clone()) {
                    let node = match lookup.get(&target.target) {
                        Some(idx) => recorded[*idx].node(),
                        None => bare
                            .get(&target.target)
                            .map_or_else(|| GraphNode::orphan(&target.target), |b| b.node()),
                    };
                    graph.nodes.push(node);
                }
            }
        }
    }
    tracing::debug!(
        "Graph: {} nodes, {} edges from {} blocks",
        graph.nodes.len(),
        graph.edges.len(),
        recorded.len()
    );
    Ok(graph)
}
