//! Static 2-D k-d tree used to find attachment candidates during generation.
//!
//! Nodes live in an arena and refer to their children by index. The tree is
//! built once from a point set and only read afterwards.

#[derive(Debug, Clone)]
struct KdNode {
    idx: usize,
    point: [f64; 2],
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl KdTree {
    /// Builds a tree over `points`; result indices refer to positions in this slice.
    pub fn build(points: &[[f64; 2]]) -> Self {
        let mut items: Vec<(usize, [f64; 2])> = points.iter().copied().enumerate().collect();
        let mut tree = KdTree {
            nodes: Vec::with_capacity(items.len()),
            root: None,
        };
        tree.root = tree.build_rec(&mut items, 0);
        tree
    }

    // Median split on the current axis; alternates x, y by depth.
    fn build_rec(&mut self, items: &mut [(usize, [f64; 2])], depth: usize) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        let axis = depth % 2;
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| a.1[axis].total_cmp(&b.1[axis]));

        let (idx, point) = items[mid];
        let slot = self.nodes.len();
        self.nodes.push(KdNode {
            idx,
            point,
            left: None,
            right: None,
        });

        let (lower, rest) = items.split_at_mut(mid);
        let left = self.build_rec(lower, depth + 1);
        let right = self.build_rec(&mut rest[1..], depth + 1);
        self.nodes[slot].left = left;
        self.nodes[slot].right = right;
        Some(slot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All point indices within `radius` of `(x, y)`, boundary inclusive.
    pub fn query_range(&self, x: f64, y: f64, radius: f64) -> Vec<usize> {
        let mut result = Vec::new();
        let r2 = radius * radius;
        let mut stack: Vec<(usize, usize)> = self.root.map(|r| (r, 0)).into_iter().collect();

        while let Some((slot, depth)) = stack.pop() {
            let node = &self.nodes[slot];
            let dx = node.point[0] - x;
            let dy = node.point[1] - y;
            if dx * dx + dy * dy <= r2 {
                result.push(node.idx);
            }

            let diff = if depth % 2 == 0 { x - node.point[0] } else { y - node.point[1] };
            let (near, far) = if diff < 0.0 {
                (node.left, node.right)
            } else {
                (node.right, node.left)
            };
            // The far side can only hold matches if the splitting plane is in range.
            if diff * diff <= r2 {
                if let Some(far) = far {
                    stack.push((far, depth + 1));
                }
            }
            if let Some(near) = near {
                stack.push((near, depth + 1));
            }
        }
        result
    }
}

/// Linear scan equivalent of [`KdTree::query_range`], in index order.
pub fn scan_range(points: &[[f64; 2]], x: f64, y: f64, radius: f64) -> Vec<usize> {
    let r2 = radius * radius;
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            let dx = p[0] - x;
            let dy = p[1] - y;
            dx * dx + dy * dy <= r2
        })
        .map(|(i, _)| i)
        .collect()
}

/// Indices of the `k` points closest to `(x, y)`, nearest first.
pub fn nearest(points: &[[f64; 2]], x: f64, y: f64, k: usize) -> Vec<usize> {
    let mut by_dist: Vec<(f64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| ((p[0] - x).powi(2) + (p[1] - y).powi(2), i))
        .collect();
    by_dist.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    by_dist.into_iter().take(k).map(|(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<[f64; 2]> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n)
            .map(|_| [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)])
            .collect()
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.query_range(0.5, 0.5, 10.0).is_empty());
    }

    #[test]
    fn boundary_is_inclusive() {
        let tree = KdTree::build(&[[0.0, 0.0], [0.5, 0.0], [0.0, 0.25]]);
        let mut hits = tree.query_range(0.0, 0.0, 0.5);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1, 2]);

        let hits = tree.query_range(0.0, 0.0, 0.2);
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn matches_linear_scan() {
        let points = random_points(500, 7);
        let tree = KdTree::build(&points);
        assert_eq!(tree.len(), 500);

        for (qx, qy, r) in [(0.5, 0.5, 0.1), (0.0, 0.0, 0.3), (0.9, 0.2, 0.05), (0.3, 0.7, 2.0)] {
            let mut from_tree = tree.query_range(qx, qy, r);
            from_tree.sort_unstable();
            assert_eq!(from_tree, scan_range(&points, qx, qy, r));
        }
    }

    #[test]
    fn duplicate_points_are_all_reported() {
        let points = vec![[0.2, 0.2]; 6];
        let tree = KdTree::build(&points);
        assert_eq!(tree.query_range(0.2, 0.2, 0.0).len(), 6);
    }

    #[test]
    fn nearest_orders_by_distance() {
        let points = [[0.9, 0.9], [0.1, 0.1], [0.5, 0.5], [0.11, 0.1]];
        assert_eq!(nearest(&points, 0.0, 0.0, 2), vec![1, 3]);
        assert_eq!(nearest(&points, 0.0, 0.0, 10).len(), 4);
    }
}
