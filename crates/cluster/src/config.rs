use serde::{Deserialize, Serialize};

pub const MIN_TREE_DEPTH: usize = 2;
pub const MAX_TREE_DEPTH: usize = 20;
pub const DEFAULT_TREE_DEPTH: usize = 14;
pub const DEFAULT_CLUSTER_DISTANCE_PX: u32 = 40;

/// Opaque handle to a host-provided marker image.
///
/// The engine never looks inside it; it rides along for the renderer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerImage(pub u64);

/// Clustering configuration.
///
/// `tree_depth` values outside `[MIN_TREE_DEPTH, MAX_TREE_DEPTH]` are
/// accepted and clamped silently wherever the depth is consumed.
/// `cluster_distance_px` is the pixel threshold of the closest-node search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    pub clustering: bool,
    pub tree_depth: usize,
    pub cluster_distance_px: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_image: Option<MarkerImage>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            clustering: false,
            tree_depth: DEFAULT_TREE_DEPTH,
            cluster_distance_px: DEFAULT_CLUSTER_DISTANCE_PX,
            marker_image: None,
        }
    }
}

impl ClusterConfig {
    pub fn clamped_depth(&self) -> usize {
        self.tree_depth.clamp(MIN_TREE_DEPTH, MAX_TREE_DEPTH)
    }
}
