use foundation::math::Vec2;
use foundation::math::mercator;

use crate::engine::PlacemarkSet;

/// A cluster entry of the render frontier: projected centroid plus the
/// number of markers it aggregates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrontierCluster {
    pub proj: Vec2,
    pub count: usize,
}

/// Render frontier at one zoom level: visible single markers as bare
/// points, visible aggregates as cluster descriptors.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrontierSnapshot {
    pub points: Vec<Vec2>,
    pub clusters: Vec<FrontierCluster>,
}

impl FrontierSnapshot {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.clusters.is_empty()
    }
}

impl PlacemarkSet {
    /// Extracts the render frontier for `camera_scale`.
    ///
    /// The scale selects one stratum of the forest (coarser when zoomed
    /// out); with clustering disabled the finest stratum is always read, so
    /// every marker renders individually. Nodes with no visible descendants
    /// are omitted.
    ///
    /// Ordering contract: entries appear in ascending node-id order.
    pub fn frontier(&self, camera_scale: f64) -> FrontierSnapshot {
        let max_level = self.depth() - 1;
        let level = if self.config().clustering {
            let zoom = mercator::scale_to_zoom(camera_scale) - 1;
            zoom.clamp(0, max_level as i32) as usize
        } else {
            max_level
        };

        let mut snapshot = FrontierSnapshot::default();
        for &node_id in &self.levels[level] {
            let node = self.nodes.node(node_id);
            if node.visible_count == 0 {
                continue;
            }
            if node.is_single() {
                snapshot.points.push(node.proj);
            } else {
                snapshot.clusters.push(FrontierCluster {
                    proj: node.proj,
                    count: node.count,
                });
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::FrontierCluster;
    use crate::config::ClusterConfig;
    use crate::engine::PlacemarkSet;
    use crate::projection::{GeoPos, PlanarProjection};
    use foundation::math::Vec2;

    fn test_set(depth: usize, distance_px: u32) -> PlacemarkSet {
        PlacemarkSet::new(ClusterConfig {
            clustering: true,
            tree_depth: depth,
            cluster_distance_px: distance_px,
            marker_image: None,
        })
    }

    fn at(x: f64, y: f64) -> GeoPos {
        GeoPos::new(y, x)
    }

    /// Camera scale whose zoom maps exactly to `level`:
    /// `round(17 - log2(1/s)) - 1 == level` at `s = 2^(level - 16)`.
    fn scale_for_level(level: i32) -> f64 {
        2f64.powi(level - 16)
    }

    #[test]
    fn empty_set_yields_empty_frontier() {
        let set = test_set(3, 10);
        assert!(set.frontier(1.0).is_empty());
        assert!(set.frontier(scale_for_level(0)).is_empty());
    }

    #[test]
    fn close_pair_reads_as_cluster_at_coarse_zoom() {
        let mut set = test_set(3, 10);
        let proj = PlanarProjection::new(1.0);
        set.add(at(0.0, 0.0), &proj);
        set.add(at(1.0, 0.0), &proj);

        let snapshot = set.frontier(scale_for_level(0));
        assert!(snapshot.points.is_empty());
        assert_eq!(
            snapshot.clusters,
            vec![FrontierCluster {
                proj: Vec2::new(0.5, 0.0),
                count: 2,
            }]
        );
    }

    #[test]
    fn far_pair_reads_as_points_at_every_zoom() {
        let mut set = test_set(3, 10);
        let proj = PlanarProjection::new(1.0);
        set.add(at(0.0, 0.0), &proj);
        set.add(at(100.0, 0.0), &proj);

        for level in 0..3 {
            let snapshot = set.frontier(scale_for_level(level));
            assert_eq!(
                snapshot.points,
                vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0)],
                "level {level}"
            );
            assert!(snapshot.clusters.is_empty());
        }
    }

    #[test]
    fn extreme_scales_clamp_to_the_level_range() {
        let mut set = test_set(3, 10);
        let proj = PlanarProjection::new(1.0);
        set.add(at(0.0, 0.0), &proj);
        set.add(at(1.0, 0.0), &proj);

        // Zoomed all the way out: the root stratum, one cluster.
        let coarse = set.frontier(1e-12);
        assert_eq!(coarse.clusters.len(), 1);
        assert!(coarse.points.is_empty());

        // Zoomed all the way in: every leaf as a point.
        let fine = set.frontier(1e9);
        assert_eq!(fine.points.len(), 2);
        assert!(fine.clusters.is_empty());
    }

    #[test]
    fn disabled_clustering_forces_the_leaf_stratum() {
        let mut set = test_set(3, 10);
        let proj = PlanarProjection::new(1.0);
        set.add(at(0.0, 0.0), &proj);
        set.add(at(1.0, 0.0), &proj);

        set.set_clustering(false);
        let snapshot = set.frontier(scale_for_level(0));
        assert_eq!(snapshot.points.len(), 2);
        assert!(snapshot.clusters.is_empty());

        // The forest is still maintained, so re-enabling is cheap.
        set.set_clustering(true);
        assert_eq!(set.frontier(scale_for_level(0)).clusters.len(), 1);
    }

    #[test]
    fn hidden_markers_are_omitted() {
        let mut set = test_set(3, 10);
        let proj = PlanarProjection::new(1.0);
        let m0 = set.add(at(0.0, 0.0), &proj);
        let m1 = set.add(at(100.0, 0.0), &proj);

        set.set_visibility(m0, false);
        let snapshot = set.frontier(scale_for_level(2));
        assert_eq!(snapshot.points, vec![Vec2::new(100.0, 0.0)]);

        // A cluster keeps rendering while any descendant is visible, and
        // disappears once none are.
        let m2 = set.add(at(101.0, 0.0), &proj);
        let coarse = set.frontier(scale_for_level(0));
        assert_eq!(coarse.clusters.len(), 1);
        assert_eq!(coarse.clusters[0].count, 2);

        set.set_visibility(m1, false);
        set.set_visibility(m2, false);
        assert!(set.frontier(scale_for_level(0)).is_empty());
    }
}
