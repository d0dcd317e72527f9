// SPDX-License-Identifier: MIT
/*
 * Copyright (c) [2023 - Present] Emily Matheys <emilymatt96@gmail.com>
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

use std::collections::BinaryHeap;

use nalgebra::Point3;

#[inline]
fn distance_squared(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a - b).norm_squared()
}

#[derive(Clone, Debug)]
struct KdNode {
    point: Point3<f64>,
    index: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

impl KdNode {
    fn new(point: Point3<f64>, index: usize) -> Self {
        Self {
            point,
            index,
            left: None,
            right: None,
        }
    }

    fn insert(&mut self, point: Point3<f64>, index: usize, depth: usize) {
        let axis = depth % 3;
        let branch = if point[axis] < self.point[axis] {
            &mut self.left
        } else {
            &mut self.right
        };

        match branch {
            Some(child) => child.insert(point, index, depth + 1),
            None => *branch = Some(Box::new(KdNode::new(point, index))),
        }
    }

    fn nearest<'a>(
        &'a self,
        target: &Point3<f64>,
        depth: usize,
        best: &mut Option<(&'a KdNode, f64)>,
    ) {
        let d = distance_squared(&self.point, target);
        if best.map(|(_, best_d)| d < best_d).unwrap_or(true) {
            *best = Some((self, d));
        }

        let axis = depth % 3;
        let axis_distance = target[axis] - self.point[axis];
        let (near, far) = if axis_distance < 0.0 {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(near) = near {
            near.nearest(target, depth + 1, best);
        }
        if axis_distance * axis_distance < best.map(|(_, d)| d).unwrap_or(f64::MAX) {
            if let Some(far) = far {
                far.nearest(target, depth + 1, best);
            }
        }
    }

    fn k_nearest(
        &self,
        target: &Point3<f64>,
        k: usize,
        depth: usize,
        heap: &mut BinaryHeap<Neighbor>,
    ) {
        let d = distance_squared(&self.point, target);
        if heap.len() < k {
            heap.push(Neighbor {
                index: self.index,
                distance_sq: d,
            });
        } else if let Some(worst) = heap.peek() {
            if d < worst.distance_sq {
                heap.pop();
                heap.push(Neighbor {
                    index: self.index,
                    distance_sq: d,
                });
            }
        }

        let axis = depth % 3;
        let axis_distance = target[axis] - self.point[axis];
        let (near, far) = if axis_distance < 0.0 {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(near) = near {
            near.k_nearest(target, k, depth + 1, heap);
        }

        let worst_distance = if heap.len() < k {
            f64::MAX
        } else {
            heap.peek().map(|n| n.distance_sq).unwrap_or(f64::MAX)
        };
        if axis_distance * axis_distance < worst_distance {
            if let Some(far) = far {
                far.k_nearest(target, k, depth + 1, heap);
            }
        }
    }

    fn within_radius(
        &self,
        target: &Point3<f64>,
        radius_sq: f64,
        depth: usize,
        out: &mut Vec<Neighbor>,
    ) {
        let d = distance_squared(&self.point, target);
        if d <= radius_sq {
            out.push(Neighbor {
                index: self.index,
                distance_sq: d,
            });
        }

        let axis = depth % 3;
        let axis_distance = target[axis] - self.point[axis];
        let (near, far) = if axis_distance < 0.0 {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(near) = near {
            near.within_radius(target, radius_sq, depth + 1, out);
        }
        if axis_distance * axis_distance <= radius_sq {
            if let Some(far) = far {
                far.within_radius(target, radius_sq, depth + 1, out);
            }
        }
    }
}

/// A neighbor search result: the index of the point in the cloud the tree
/// was built from, and its squared distance to the query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Index into the point cloud the tree was built from.
    pub index: usize,
    /// Squared Euclidean distance to the query point.
    pub distance_sq: f64,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    // Max-heap by distance, so callers can bound a k-nearest search by
    // evicting the current worst candidate in O(log k).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance_sq.partial_cmp(&other.distance_sq).unwrap()
    }
}

/// A k-d tree over a fixed 3D point cloud, indexed by the point's original
/// position in the cloud. Supports nearest, k-nearest, and radius queries,
/// used by normal estimation and feature extraction to find local
/// neighborhoods without an `O(n^2)` scan.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    root: Option<KdNode>,
    len: usize,
}

impl KdTree {
    /// Builds a tree from a point cloud, recording each point's original
    /// index so query results can be traced back to it.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Build KD Tree", skip_all, level = "debug")
    )]
    pub fn build(points: &[Point3<f64>]) -> Self {
        let mut tree = Self::default();
        for (index, point) in points.iter().enumerate() {
            tree.insert(*point, index);
        }
        tree
    }

    /// Inserts a single point under the given original index.
    pub fn insert(&mut self, point: Point3<f64>, index: usize) {
        match &mut self.root {
            Some(root) => root.insert(point, index, 0),
            None => self.root = Some(KdNode::new(point, index)),
        }
        self.len += 1;
    }

    /// The number of points held by the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finds the single nearest point to `target`.
    ///
    /// # Returns
    /// `None` if the tree is empty.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("KD Tree Nearest", skip_all, level = "trace")
    )]
    pub fn nearest(&self, target: &Point3<f64>) -> Option<Neighbor> {
        let root = self.root.as_ref()?;
        let mut best = None;
        root.nearest(target, 0, &mut best);
        best.map(|(node, d)| Neighbor {
            index: node.index,
            distance_sq: d,
        })
    }

    /// Finds up to `k` nearest points to `target`, sorted by ascending
    /// distance.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("KD Tree K-Nearest", skip_all, level = "trace")
    )]
    pub fn k_nearest(&self, target: &Point3<f64>, k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = self.root.as_ref() {
            root.k_nearest(target, k, 0, &mut heap);
        }
        let mut results: Vec<_> = heap.into_vec();
        results.sort_by(|a, b| a.distance_sq.partial_cmp(&b.distance_sq).unwrap());
        results
    }

    /// Finds every point within `radius` of `target`, unsorted.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("KD Tree Radius Search", skip_all, level = "trace")
    )]
    pub fn within_radius(&self, target: &Point3<f64>, radius: f64) -> Vec<Neighbor> {
        let mut out = Vec::new();
        if let Some(root) = self.root.as_ref() {
            root.within_radius(target, radius * radius, 0, &mut out);
        }
        out
    }

    /// Finds the union of a k-nearest and a radius search ("hybrid" search,
    /// as used by the feature extractor): every point within `radius`, plus
    /// enough of the closest remaining points to reach `k` total, whichever
    /// is larger.
    pub fn hybrid_search(&self, target: &Point3<f64>, radius: f64, k: usize) -> Vec<Neighbor> {
        let mut by_radius = self.within_radius(target, radius);
        if by_radius.len() >= k {
            return by_radius;
        }
        let by_knn = self.k_nearest(target, k);
        if by_knn.len() > by_radius.len() {
            by_radius = by_knn;
        }
        by_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 2.0, 1.0),
            Point3::new(-1.0, 4.0, 2.5),
            Point3::new(1.3, 2.5, 0.5),
            Point3::new(-2.1, 0.2, -0.2),
        ]
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::default();
        assert!(tree.is_empty());
        assert!(tree.nearest(&Point3::origin()).is_none());
        assert!(tree.k_nearest(&Point3::origin(), 3).is_empty());
    }

    #[test]
    fn test_nearest() {
        let tree = KdTree::build(&sample_points());
        let nearest = tree.nearest(&Point3::new(1.32, 2.7, 0.2)).unwrap();
        assert_eq!(nearest.index, 2);
    }

    #[test]
    fn test_k_nearest_matches_naive() {
        let points = sample_points();
        let tree = KdTree::build(&points);
        let target = Point3::new(0.0, 0.0, 0.0);

        let mut naive: Vec<_> = points
            .iter()
            .enumerate()
            .map(|(index, point)| Neighbor {
                index,
                distance_sq: distance_squared(point, &target),
            })
            .collect();
        naive.sort_by(|a, b| a.distance_sq.partial_cmp(&b.distance_sq).unwrap());

        let result = tree.k_nearest(&target, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].index, naive[0].index);
        assert_eq!(result[1].index, naive[1].index);
    }

    #[test]
    fn test_k_nearest_saturates_at_tree_size() {
        let tree = KdTree::build(&sample_points());
        assert_eq!(tree.k_nearest(&Point3::origin(), 100).len(), 4);
    }

    #[test]
    fn test_within_radius() {
        let tree = KdTree::build(&sample_points());
        let hits = tree.within_radius(&Point3::new(0.0, 2.0, 1.0), 0.01);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn test_duplicate_points_are_both_retained() {
        let mut tree = KdTree::default();
        tree.insert(Point3::new(1.0, 1.0, 1.0), 0);
        tree.insert(Point3::new(1.0, 1.0, 1.0), 1);
        assert_eq!(tree.len(), 2);
        let hits = tree.within_radius(&Point3::new(1.0, 1.0, 1.0), 1e-9);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_hybrid_search_prefers_larger_set() {
        let tree = KdTree::build(&sample_points());
        let hits = tree.hybrid_search(&Point3::origin(), 0.01, 2);
        assert_eq!(hits.len(), 2);
    }
}
