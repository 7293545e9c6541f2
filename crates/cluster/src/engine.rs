use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use foundation::math::Vec2;
use foundation::math::precision::stable_total_cmp_f64;
use foundation::{IdAllocator, MarkerId, NodeId};

use crate::config::{ClusterConfig, MAX_TREE_DEPTH, MIN_TREE_DEPTH, MarkerImage};
use crate::node::{ClusterNode, NodeStore, corrupt};
use crate::projection::{GeoPos, Projection};

/// Immediate children of a cluster node, split into single markers and
/// sub-clusters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClusterChildren {
    pub markers: Vec<MarkerId>,
    pub clusters: Vec<NodeId>,
}

/// One step of a marker's ancestor chain, root first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClusterPathEntry {
    pub level: usize,
    pub node_id: NodeId,
    pub marker_id: Option<MarkerId>,
    pub count: usize,
    pub visible_count: usize,
}

/// Hierarchical clustering set for map placemarks.
///
/// Maintains a forest of cluster trees across a fixed range of zoom levels:
/// level `0` is the coarsest stratum, level `depth - 1` holds one leaf per
/// marker. Insertion and removal are incremental; a changed tree depth takes
/// effect on the next `recompute` or `remove_all`.
///
/// Ordering contract:
/// - Level sets and id maps iterate in ascending id order, so closest-node
///   search, frontier extraction and recompute are deterministic for a
///   given mutation history.
#[derive(Debug, Clone)]
pub struct PlacemarkSet {
    pub(crate) config: ClusterConfig,
    /// Active level table. Its length is the depth the forest was built
    /// with, which may lag `config.tree_depth` until the next rebuild.
    pub(crate) levels: Vec<BTreeSet<NodeId>>,
    pub(crate) nodes: NodeStore,
    pub(crate) markers: BTreeMap<MarkerId, NodeId>,
    pub(crate) visible: BTreeMap<MarkerId, bool>,
    pub(crate) selected: BTreeMap<MarkerId, bool>,
    marker_ids: IdAllocator,
    node_ids: IdAllocator,
}

impl PlacemarkSet {
    pub fn new(config: ClusterConfig) -> Self {
        let depth = config.clamped_depth();
        Self {
            config,
            levels: vec![BTreeSet::new(); depth],
            nodes: NodeStore::new(),
            markers: BTreeMap::new(),
            visible: BTreeMap::new(),
            selected: BTreeMap::new(),
            marker_ids: IdAllocator::new(),
            node_ids: IdAllocator::new(),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Active clustering depth (number of strata in the forest).
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Number of live markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Master clustering toggle. The forest is maintained either way; this
    /// only changes which stratum `frontier` reads.
    pub fn set_clustering(&mut self, enable: bool) {
        self.config.clustering = enable;
    }

    /// Clamped to `[MIN_TREE_DEPTH, MAX_TREE_DEPTH]`. Takes effect on the
    /// next `recompute` or `remove_all`.
    pub fn set_tree_depth(&mut self, depth: usize) {
        self.config.tree_depth = depth.clamp(MIN_TREE_DEPTH, MAX_TREE_DEPTH);
    }

    pub fn set_cluster_distance(&mut self, distance_px: u32) {
        self.config.cluster_distance_px = distance_px;
    }

    pub fn set_marker_image(&mut self, image: Option<MarkerImage>) {
        self.config.marker_image = image;
    }

    /// Replaces the whole configuration, clamping the depth. As with
    /// `set_tree_depth`, a depth change only reshapes the forest on the
    /// next `recompute` or `remove_all`.
    pub fn apply(&mut self, mut config: ClusterConfig) {
        config.tree_depth = config.clamped_depth();
        self.config = config;
    }

    /// Adds a marker at `pos` and clusters it into the forest.
    ///
    /// Returns the new marker id. Ids are monotonic and never reused; the
    /// generator is rewound only by `remove_all`.
    pub fn add<P: Projection + ?Sized>(&mut self, pos: GeoPos, projection: &P) -> MarkerId {
        let marker_id = MarkerId(self.marker_ids.next_raw());
        let node_id = NodeId(self.node_ids.next_raw());
        let leaf_level = self.depth() - 1;
        debug!(marker = %marker_id, node = %node_id, "adding marker");

        let leaf = ClusterNode::leaf(node_id, leaf_level, projection.geo_to_proj(pos), marker_id);
        self.levels[leaf_level].insert(node_id);
        self.nodes.insert(leaf);
        self.markers.insert(marker_id, node_id);
        self.visible.insert(marker_id, true);
        self.selected.insert(marker_id, false);

        self.cluster_upward(node_id, projection.current_scale());
        marker_id
    }

    /// Removes a marker, propagating counts and centroid corrections up its
    /// ancestor chain and freeing interior nodes that become empty.
    ///
    /// Returns `false` when the marker id is unknown.
    pub fn remove(&mut self, marker_id: MarkerId) -> bool {
        let Some(&leaf_id) = self.markers.get(&marker_id) else {
            warn!(marker = %marker_id, "remove: unknown marker");
            return false;
        };
        debug!(marker = %marker_id, node = %leaf_id, "removing marker");

        let delta_visible = usize::from(self.visible.get(&marker_id).copied().unwrap_or(false));
        let delta_selected = usize::from(self.selected.get(&marker_id).copied().unwrap_or(false));
        let (leaf_proj, leaf_parent) = {
            let leaf = self.nodes.node(leaf_id);
            (leaf.proj, leaf.parent)
        };

        // Detach the leaf before walking its ancestors.
        if let Some(pid) = leaf_parent {
            self.nodes.node_mut(pid).children.remove(&leaf_id);
        }

        let mut current = leaf_parent;
        while let Some(ancestor_id) = current {
            let next = self.nodes.node(ancestor_id).parent;

            let (count_after, level) = {
                let ancestor = self.nodes.node_mut(ancestor_id);
                if ancestor.count > 1 {
                    // Undo the leaf's contribution to the weighted centroid.
                    ancestor.proj = (ancestor.proj * ancestor.count as f64 - leaf_proj)
                        / (ancestor.count - 1) as f64;
                }
                ancestor.count -= 1;
                ancestor.visible_count -= delta_visible;
                ancestor.selected_count -= delta_selected;
                (ancestor.count, ancestor.level)
            };

            if count_after == 0 {
                debug!(node = %ancestor_id, level, "freeing empty node");
                if let Some(pid) = next {
                    self.nodes.node_mut(pid).children.remove(&ancestor_id);
                }
                if !self.levels[level].remove(&ancestor_id) {
                    corrupt(format_args!(
                        "node {ancestor_id} missing from level {level}"
                    ));
                }
                self.nodes.remove(ancestor_id);
            } else if count_after == 1 {
                // The stratum stands for a single marker again; adopt its
                // identity from the remaining chain.
                let child_id = self.nodes.node(ancestor_id).children.first().copied();
                if let Some(child_id) = child_id {
                    let adopted = self.nodes.node(child_id).marker_id;
                    self.nodes.node_mut(ancestor_id).marker_id = adopted;
                }
            }

            current = next;
        }

        // Drop the leaf and its registrations.
        let leaf_level = self.depth() - 1;
        self.levels[leaf_level].remove(&leaf_id);
        self.nodes.remove(leaf_id);
        self.markers.remove(&marker_id);
        self.visible.remove(&marker_id);
        self.selected.remove(&marker_id);
        true
    }

    /// Clears every marker and node and resets both id generators, leaving
    /// the set indistinguishable from a freshly built one with the same
    /// configuration. A pending tree-depth change takes effect here.
    pub fn remove_all(&mut self) {
        debug!(markers = self.markers.len(), "removing all markers");
        let depth = self.config.clamped_depth();
        self.levels = vec![BTreeSet::new(); depth];
        self.nodes.clear();
        self.markers.clear();
        self.visible.clear();
        self.selected.clear();
        self.marker_ids.reset();
        self.node_ids.reset();
    }

    /// Rebuilds the interior of the forest from the surviving leaves.
    ///
    /// Marker ids and per-marker flags are preserved; node ids restart from
    /// zero. Leaves are reinserted in ascending marker-id order, so equal
    /// marker sets with equal insertion histories rebuild equal forests.
    pub fn recompute<P: Projection + ?Sized>(&mut self, projection: &P) {
        debug!(markers = self.markers.len(), "recomputing clusters");

        // Pull the leaves out, then rebuild the store with fresh node ids
        // (the node-id space restarts at zero, so leaves cannot stay put).
        let mut leaves: Vec<(MarkerId, ClusterNode)> = Vec::with_capacity(self.markers.len());
        for (&marker_id, &old_id) in &self.markers {
            match self.nodes.remove(old_id) {
                Some(leaf) => leaves.push((marker_id, leaf)),
                None => corrupt(format_args!("leaf node {old_id} not in store")),
            }
        }
        self.nodes.clear();
        self.node_ids.reset();

        let depth = self.config.clamped_depth();
        self.levels = vec![BTreeSet::new(); depth];

        let mut reinserted: Vec<NodeId> = Vec::with_capacity(leaves.len());
        for (marker_id, mut leaf) in leaves {
            let new_id = NodeId(self.node_ids.next_raw());
            leaf.node_id = new_id;
            leaf.level = depth - 1;
            leaf.parent = None;
            leaf.children.clear();
            self.levels[depth - 1].insert(new_id);
            self.nodes.insert(leaf);
            self.markers.insert(marker_id, new_id);
            reinserted.push(new_id);
        }

        // Re-cluster each leaf exactly as an incremental add would.
        let scale = projection.current_scale();
        for node_id in reinserted {
            self.cluster_upward(node_id, scale);
        }
    }

    /// Sets a marker's visibility flag, propagating the delta up the
    /// ancestor chain.
    ///
    /// Returns `true` if the stored state changed; unknown markers and
    /// no-op writes return `false`.
    pub fn set_visibility(&mut self, marker_id: MarkerId, visible: bool) -> bool {
        let Some(&leaf_id) = self.markers.get(&marker_id) else {
            warn!(marker = %marker_id, "set_visibility: unknown marker");
            return false;
        };
        if self.visible.get(&marker_id) == Some(&visible) {
            return false;
        }

        self.nodes.node_mut(leaf_id).visible_count = usize::from(visible);
        let mut current = self.nodes.node(leaf_id).parent;
        while let Some(ancestor_id) = current {
            let ancestor = self.nodes.node_mut(ancestor_id);
            if visible {
                ancestor.visible_count += 1;
            } else {
                ancestor.visible_count -= 1;
            }
            current = ancestor.parent;
        }

        self.visible.insert(marker_id, visible);
        true
    }

    /// Mirror of `set_visibility` for the selection flag.
    pub fn set_selected(&mut self, marker_id: MarkerId, selected: bool) -> bool {
        let Some(&leaf_id) = self.markers.get(&marker_id) else {
            warn!(marker = %marker_id, "set_selected: unknown marker");
            return false;
        };
        if self.selected.get(&marker_id) == Some(&selected) {
            return false;
        }

        self.nodes.node_mut(leaf_id).selected_count = usize::from(selected);
        let mut current = self.nodes.node(leaf_id).parent;
        while let Some(ancestor_id) = current {
            let ancestor = self.nodes.node_mut(ancestor_id);
            if selected {
                ancestor.selected_count += 1;
            } else {
                ancestor.selected_count -= 1;
            }
            current = ancestor.parent;
        }

        self.selected.insert(marker_id, selected);
        true
    }

    pub fn visibility(&self, marker_id: MarkerId) -> Option<bool> {
        self.visible.get(&marker_id).copied()
    }

    pub fn is_selected(&self, marker_id: MarkerId) -> Option<bool> {
        self.selected.get(&marker_id).copied()
    }

    /// Immediate children of `node_id`, split into single markers and
    /// sub-clusters. Unknown ids yield an empty result.
    pub fn cluster_children(&self, node_id: NodeId) -> ClusterChildren {
        let mut out = ClusterChildren::default();
        let Some(node) = self.nodes.get(node_id) else {
            warn!(node = %node_id, "cluster_children: unknown node");
            return out;
        };
        for &child_id in &node.children {
            let child = self.nodes.node(child_id);
            if child.is_single() {
                match child.marker_id {
                    Some(marker) => out.markers.push(marker),
                    None => corrupt(format_args!(
                        "single-marker node {child_id} has no marker id"
                    )),
                }
            } else {
                out.clusters.push(child_id);
            }
        }
        out
    }

    /// Every marker id contained in the subtree under `node_id`, gathered
    /// depth-first, children in ascending node-id order. Unknown ids yield
    /// an empty list.
    pub fn all_markers_in(&self, node_id: NodeId) -> Vec<MarkerId> {
        let Some(node) = self.nodes.get(node_id) else {
            warn!(node = %node_id, "all_markers_in: unknown node");
            return Vec::new();
        };

        let mut out = Vec::new();
        if node.is_single() {
            if let Some(marker) = node.marker_id {
                out.push(marker);
            }
            return out;
        }
        self.collect_markers(node_id, &mut out);
        out
    }

    fn collect_markers(&self, node_id: NodeId, out: &mut Vec<MarkerId>) {
        let children = self.cluster_children(node_id);
        out.extend(children.markers);
        for cluster_id in children.clusters {
            self.collect_markers(cluster_id, out);
        }
    }

    /// Ancestor chain of a marker, root first. Unknown markers yield an
    /// empty path.
    pub fn cluster_path(&self, marker_id: MarkerId) -> Vec<ClusterPathEntry> {
        let Some(&leaf_id) = self.markers.get(&marker_id) else {
            warn!(marker = %marker_id, "cluster_path: unknown marker");
            return Vec::new();
        };

        let mut chain = Vec::new();
        let mut current = Some(leaf_id);
        while let Some(node_id) = current {
            let node = self.nodes.node(node_id);
            chain.push(ClusterPathEntry {
                level: node.level,
                node_id,
                marker_id: node.marker_id,
                count: node.count,
                visible_count: node.visible_count,
            });
            current = node.parent;
        }
        chain.reverse();
        chain
    }

    /// Inserts a freshly registered leaf into the upper strata.
    ///
    /// Ascent: walk from the stratum above the leaf toward the root. At each
    /// level either absorb the new chain into the closest existing node, or
    /// mirror it with a parentless singleton and keep climbing.
    ///
    /// Refinement: once absorbed, re-derive every ancestor from its children
    /// and merge any same-level partner the camera scale now puts within
    /// clustering distance, cascading the merged nodes' parents upward.
    fn cluster_upward(&mut self, start: NodeId, scale: f64) {
        let mut node_id = start;
        let mut absorbed = false;

        for level in (0..self.nodes.node(start).level).rev() {
            if let Some(closest_id) = self.closest_node(node_id, level, scale) {
                debug!(node = %node_id, into = %closest_id, level, "absorbing into closest node");
                let (node_proj, node_count, node_visible, node_selected) = {
                    let n = self.nodes.node(node_id);
                    (n.proj, n.count, n.visible_count, n.selected_count)
                };
                let closest = self.nodes.node_mut(closest_id);
                let new_count = closest.count + node_count;
                closest.proj = (closest.proj * closest.count as f64
                    + node_proj * node_count as f64)
                    / new_count as f64;
                closest.count = new_count;
                closest.visible_count += node_visible;
                closest.selected_count += node_selected;
                closest.marker_id = None;
                closest.children.insert(node_id);
                self.nodes.node_mut(node_id).parent = Some(closest_id);

                node_id = closest_id;
                absorbed = true;
                break;
            }

            // No partner: mirror the chain with a parentless singleton.
            let mirror_id = NodeId(self.node_ids.next_raw());
            let mirror = {
                let n = self.nodes.node(node_id);
                ClusterNode {
                    node_id: mirror_id,
                    level,
                    proj: n.proj,
                    count: n.count,
                    visible_count: n.visible_count,
                    selected_count: n.selected_count,
                    marker_id: n.marker_id,
                    parent: None,
                    children: BTreeSet::from([node_id]),
                }
            };
            self.levels[level].insert(mirror_id);
            self.nodes.insert(mirror);
            self.nodes.node_mut(node_id).parent = Some(mirror_id);
            node_id = mirror_id;
        }

        if !absorbed {
            // The new chain reached the root stratum without meeting anyone;
            // all its ancestors are fresh singletons with exact aggregates.
            return;
        }

        // The ancestors of the absorption point carry stale aggregates and
        // may themselves have drifted into clustering range.
        let mut to_merge: BTreeSet<NodeId> = BTreeSet::new();
        let mut current = self.nodes.node(node_id).parent;
        while let Some(ancestor_id) = current {
            let mut parents_to_merge: BTreeSet<NodeId> = BTreeSet::new();

            for merging in to_merge {
                if merging == ancestor_id {
                    corrupt(format_args!(
                        "node {ancestor_id} scheduled to merge into itself"
                    ));
                }
                self.merge_nodes(ancestor_id, merging, &mut parents_to_merge);
            }

            self.refresh_from_children(ancestor_id);

            let level = self.nodes.node(ancestor_id).level;
            if let Some(closest_id) = self.closest_node(ancestor_id, level, scale) {
                self.merge_nodes(ancestor_id, closest_id, &mut parents_to_merge);
            }

            to_merge = parents_to_merge;
            current = self.nodes.node(ancestor_id).parent;
        }
    }

    /// Closest other node to `target` within its level, subject to the
    /// configured pixel threshold scaled by the camera.
    ///
    /// Candidates are scanned in ascending node-id order and must be
    /// strictly closer to displace the running best, so exact distance ties
    /// resolve to the lowest node id.
    fn closest_node(&self, target: NodeId, level: usize, scale: f64) -> Option<NodeId> {
        let target_proj = self.nodes.node(target).proj;
        let threshold = f64::from(self.config.cluster_distance_px);

        let mut best: Option<(f64, NodeId)> = None;
        for &other_id in &self.levels[level] {
            if other_id == target {
                continue;
            }
            let d2 = target_proj.distance2(self.nodes.node(other_id).proj) * scale;
            let better = match best {
                None => true,
                Some((best_d2, _)) => stable_total_cmp_f64(d2, best_d2).is_lt(),
            };
            if better {
                best = Some((d2, other_id));
            }
        }

        match best {
            Some((d2, id)) if d2 <= threshold => Some(id),
            _ => None,
        }
    }

    /// Merges `merging` into `node` (same level), reparenting children and
    /// freeing `merging`.
    ///
    /// Parent counts get a provisional adjustment here; the refinement
    /// ascent re-derives them authoritatively one level up. When the two
    /// parents differ, `merging`'s parent is recorded in `parents_to_merge`
    /// so the cascade continues above.
    fn merge_nodes(
        &mut self,
        node: NodeId,
        merging: NodeId,
        parents_to_merge: &mut BTreeSet<NodeId>,
    ) {
        if node == merging {
            corrupt(format_args!("attempt to merge node {node} into itself"));
        }

        let merging_node = match self.nodes.remove(merging) {
            Some(n) => n,
            None => corrupt(format_args!("merge source {merging} not in store")),
        };
        let (node_level, node_parent) = {
            let n = self.nodes.node(node);
            (n.level, n.parent)
        };
        if node_level != merging_node.level {
            corrupt(format_args!(
                "merge of node {merging} (level {}) into node {node} (level {node_level})",
                merging_node.level
            ));
        }
        debug!(into = %node, from = %merging, level = node_level, "merging nodes");

        {
            let n = self.nodes.node_mut(node);
            let new_count = n.count + merging_node.count;
            n.proj = (n.proj * n.count as f64 + merging_node.proj * merging_node.count as f64)
                / new_count as f64;
            n.count = new_count;
            n.visible_count += merging_node.visible_count;
            n.selected_count += merging_node.selected_count;
            n.marker_id = None;
        }

        // Reparent the merged node's children.
        for &child_id in &merging_node.children {
            self.nodes.node_mut(child_id).parent = Some(node);
        }
        self.nodes
            .node_mut(node)
            .children
            .extend(merging_node.children.iter().copied());

        // Provisional parent-count bookkeeping (roots have no parent).
        if let Some(pid) = node_parent {
            self.nodes.node_mut(pid).count += merging_node.count;
        }
        if let Some(pid) = merging_node.parent {
            let parent = self.nodes.node_mut(pid);
            parent.count -= merging_node.count;
            parent.children.remove(&merging);
            if node_parent != Some(pid) {
                parents_to_merge.insert(pid);
            }
        }

        if !self.levels[merging_node.level].remove(&merging) {
            corrupt(format_args!(
                "node {merging} missing from level {}",
                merging_node.level
            ));
        }
    }

    /// Re-derive a node's aggregates from its children. This is the
    /// authoritative path; incremental updates elsewhere only bridge the gap
    /// until the next refresh.
    fn refresh_from_children(&mut self, node_id: NodeId) {
        let children: Vec<NodeId> = self.nodes.node(node_id).children.iter().copied().collect();

        let mut count = 0usize;
        let mut visible_count = 0usize;
        let mut selected_count = 0usize;
        let mut weighted = Vec2::new(0.0, 0.0);
        for child_id in &children {
            let child = self.nodes.node(*child_id);
            count += child.count;
            visible_count += child.visible_count;
            selected_count += child.selected_count;
            weighted = weighted + child.proj * child.count as f64;
        }

        let node = self.nodes.node_mut(node_id);
        node.count = count;
        node.visible_count = visible_count;
        node.selected_count = selected_count;
        if count > 1 {
            node.marker_id = None;
        }
        if count > 0 {
            node.proj = weighted / count as f64;
        }
    }
}
