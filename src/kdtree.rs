//! Balanced 3D k-d tree over a point cloud.
//!
//! The tree references points by index and borrows the cloud for its whole
//! lifetime; the cloud is the single owner of the point data.
//!
//! Queries are [`KdTree::nearest`] only, with three knobs beyond the plain
//! Euclidean search:
//! - an axis mask ([`Axes`]) - inactive axes contribute nothing to the
//!   squared distance and disable pruning on their split planes
//! - an isotropic cap (`max_distance`) - hits farther than the cap are
//!   rejected
//! - per-axis caps (`max_distance_x/y/z`) - anisotropic pre-filter on the
//!   coordinate deltas, useful for flat search volumes
//!
//! All caps are inclusive upper bounds (`d <= cap`).

use crate::cloud::PointCloud;

/// Bitmask of active query axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Axes(u8);

impl Axes {
    pub const X: Axes = Axes(0b001);
    pub const Y: Axes = Axes(0b010);
    pub const Z: Axes = Axes(0b100);
    pub const XY: Axes = Axes(0b011);
    pub const XZ: Axes = Axes(0b101);
    pub const YZ: Axes = Axes(0b110);
    pub const XYZ: Axes = Axes(0b111);

    /// Whether the given axis (0 = x, 1 = y, 2 = z) is active.
    #[inline]
    pub const fn contains(self, axis: usize) -> bool {
        self.0 >> axis & 1 != 0
    }
}

impl Default for Axes {
    fn default() -> Self {
        Axes::XYZ
    }
}

/// Options for a nearest-neighbor query.
#[derive(Clone, Copy, Debug)]
pub struct NearestOptions {
    /// Axes contributing to the distance; defaults to all three.
    pub axes: Axes,
    /// Isotropic cap on the reported distance (inclusive).
    pub max_distance: f64,
    /// Per-axis cap on the x coordinate delta (inclusive).
    pub max_distance_x: Option<f64>,
    /// Per-axis cap on the y coordinate delta (inclusive).
    pub max_distance_y: Option<f64>,
    /// Per-axis cap on the z coordinate delta (inclusive).
    pub max_distance_z: Option<f64>,
}

impl Default for NearestOptions {
    fn default() -> Self {
        NearestOptions {
            axes: Axes::XYZ,
            max_distance: f64::INFINITY,
            max_distance_x: None,
            max_distance_y: None,
            max_distance_z: None,
        }
    }
}

impl NearestOptions {
    /// Convenience constructor for the common isotropic-radius query.
    pub fn within(max_distance: f64) -> Self {
        NearestOptions {
            max_distance,
            ..Default::default()
        }
    }

    #[inline]
    fn axis_cap(&self, axis: usize) -> Option<f64> {
        match axis {
            0 => self.max_distance_x,
            1 => self.max_distance_y,
            _ => self.max_distance_z,
        }
    }
}

/// A successful nearest-neighbor lookup.
#[derive(Clone, Copy, Debug)]
pub struct Nearest {
    /// Index of the winning point in the cloud.
    pub index: usize,
    /// Euclidean distance over the active axes.
    pub distance: f64,
}

const NONE: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct KdNode {
    point: u32,
    left: u32,  // NONE if absent
    right: u32, // NONE if absent
    axis: u8,
}

/// Balanced k-d tree; build once, query from any number of threads.
pub struct KdTree<'a> {
    cloud: &'a PointCloud,
    nodes: Vec<KdNode>,
    root: u32,
}

impl<'a> KdTree<'a> {
    /// Build by recursive median selection, cycling the split axis
    /// x -> y -> z with depth. `O(N log N)` expected.
    pub fn build(cloud: &'a PointCloud) -> Self {
        let mut indices: Vec<u32> = (0..cloud.len() as u32).collect();
        let mut nodes = Vec::with_capacity(cloud.len());
        let root = Self::build_recursive(&mut nodes, cloud, &mut indices, 0);
        KdTree { cloud, nodes, root }
    }

    fn build_recursive(
        nodes: &mut Vec<KdNode>,
        cloud: &PointCloud,
        indices: &mut [u32],
        depth: usize,
    ) -> u32 {
        if indices.is_empty() {
            return NONE;
        }
        let axis = depth % 3;
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            let va = cloud.points()[a as usize].coord(axis);
            let vb = cloud.points()[b as usize].coord(axis);
            va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let point = indices[mid];

        let (lower, upper) = indices.split_at_mut(mid);
        let left = Self::build_recursive(nodes, cloud, lower, depth + 1);
        let right = Self::build_recursive(nodes, cloud, &mut upper[1..], depth + 1);

        let node_idx = nodes.len() as u32;
        nodes.push(KdNode {
            point,
            left,
            right,
            axis: axis as u8,
        });
        node_idx
    }

    /// The cloud this tree indexes.
    #[inline]
    pub fn cloud(&self) -> &'a PointCloud {
        self.cloud
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nearest point to `target` under the given options, or `None` when no
    /// point satisfies the caps. On exactly tied distances any one of the
    /// tied points may win.
    pub fn nearest(&self, target: [f64; 3], options: &NearestOptions) -> Option<Nearest> {
        if self.root == NONE {
            return None;
        }
        let cap2 = if options.max_distance.is_finite() {
            options.max_distance * options.max_distance
        } else {
            f64::INFINITY
        };
        let mut best: Option<(usize, f64)> = None;
        self.search(self.root, target, options, cap2, &mut best);
        best.map(|(index, d2)| Nearest {
            index,
            distance: d2.sqrt(),
        })
    }

    fn search(
        &self,
        node_idx: u32,
        target: [f64; 3],
        options: &NearestOptions,
        cap2: f64,
        best: &mut Option<(usize, f64)>,
    ) {
        let node = self.nodes[node_idx as usize];
        let point = &self.cloud.points()[node.point as usize];

        // Candidate test: per-axis caps first, then the capped squared
        // distance over the active axes.
        let mut eligible = true;
        let mut d2 = 0.0;
        for axis in 0..3 {
            if !options.axes.contains(axis) {
                continue;
            }
            let delta = target[axis] - point.coord(axis);
            if let Some(cap) = options.axis_cap(axis) {
                if delta.abs() > cap {
                    eligible = false;
                    break;
                }
            }
            d2 += delta * delta;
        }
        if eligible && d2 <= cap2 && best.map_or(true, |(_, best2)| d2 < best2) {
            *best = Some((node.point as usize, d2));
        }

        let axis = node.axis as usize;
        if !options.axes.contains(axis) {
            // The split axis carries no distance information; neither child
            // can be pruned.
            if node.left != NONE {
                self.search(node.left, target, options, cap2, best);
            }
            if node.right != NONE {
                self.search(node.right, target, options, cap2, best);
            }
            return;
        }

        let delta = target[axis] - point.coord(axis);
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if near != NONE {
            self.search(near, target, options, cap2, best);
        }

        if far == NONE {
            return;
        }
        let plane2 = delta * delta;
        let mut visit_far = plane2 <= cap2;
        if let Some((_, best2)) = *best {
            visit_far &= plane2 < best2;
        }
        if let Some(cap) = options.axis_cap(axis) {
            visit_far &= delta.abs() <= cap;
        }
        if visit_far {
            self.search(far, target, options, cap2, best);
        }
    }
}
