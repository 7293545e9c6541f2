use std::collections::{BTreeMap, BTreeSet};

use foundation::math::Vec2;
use foundation::{MarkerId, NodeId};

/// A node of the clustering forest.
///
/// Either a leaf standing for one marker (`count == 1`, finest level,
/// `marker_id` set) or an interior aggregate. Interior nodes created by the
/// singleton-mirror path also carry `count == 1` together with the mirrored
/// marker id until a sibling joins them.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub node_id: NodeId,
    pub level: usize,
    /// Count-weighted centroid of the descendant markers, in projected
    /// coordinates.
    pub proj: Vec2,
    /// Number of markers in this subtree.
    pub count: usize,
    pub visible_count: usize,
    pub selected_count: usize,
    /// Identity of the single marker this node stands for; `None` once the
    /// node aggregates more than one.
    pub marker_id: Option<MarkerId>,
    pub parent: Option<NodeId>,
    pub children: BTreeSet<NodeId>,
}

impl ClusterNode {
    /// A fresh leaf: one visible, unselected marker.
    pub fn leaf(node_id: NodeId, level: usize, proj: Vec2, marker_id: MarkerId) -> Self {
        Self {
            node_id,
            level,
            proj,
            count: 1,
            visible_count: 1,
            selected_count: 0,
            marker_id: Some(marker_id),
            parent: None,
            children: BTreeSet::new(),
        }
    }

    /// True when this node stands for exactly one marker.
    pub fn is_single(&self) -> bool {
        self.count == 1
    }
}

/// Arena of live nodes keyed by id.
///
/// Parent/child links are plain `NodeId`s resolved through this store,
/// which keeps the bidirectional tree free of ownership cycles and makes
/// dangling references detectable. Iteration is in ascending id order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, ClusterNode>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn insert(&mut self, node: ClusterNode) {
        self.nodes.insert(node.node_id, node);
    }

    pub fn remove(&mut self, id: NodeId) -> Option<ClusterNode> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&ClusterNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ClusterNode> {
        self.nodes.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ClusterNode)> {
        self.nodes.iter().map(|(&id, n)| (id, n))
    }

    /// Resolve a node the tree invariants guarantee to exist.
    pub fn node(&self, id: NodeId) -> &ClusterNode {
        match self.nodes.get(&id) {
            Some(n) => n,
            None => corrupt(format_args!("node {id} missing from store")),
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ClusterNode {
        match self.nodes.get_mut(&id) {
            Some(n) => n,
            None => corrupt(format_args!("node {id} missing from store")),
        }
    }
}

/// Fatal internal-consistency failure: report on the diagnostic channel and
/// abort. These arise only from implementation bugs, never from caller
/// input.
pub(crate) fn corrupt(msg: std::fmt::Arguments<'_>) -> ! {
    tracing::error!("{}", msg);
    panic!("cluster tree corrupted: {}", msg);
}
