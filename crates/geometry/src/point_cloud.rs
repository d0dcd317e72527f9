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

use std::collections::HashMap;

use nalgebra::{Isometry3, Point3, SymmetricEigen, Vector3};

use crate::{kd_tree::KdTree, numeric, voxel_key::VoxelKey};

/// An RGB color triplet.
pub type Color = [u8; 3];

/// An ordered 3D point cloud with optional per-point normal and color
/// attributes.
///
/// # Invariant
/// `normals`, if present, has exactly `points.len()` entries; likewise for
/// `colors`. There is no identity or frame of reference encoded in the
/// cloud itself; the owner (e.g. a `Submap`) tracks which frame a given
/// cloud lives in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point3<f64>>,
    normals: Option<Vec<Vector3<f64>>>,
    colors: Option<Vec<Color>>,
}

impl PointCloud {
    /// Builds an empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a point cloud from points alone, with no normals or colors.
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
        }
    }

    /// Builds a point cloud, validating that `normals`/`colors` (if given)
    /// match `points` in length.
    ///
    /// # Panics
    /// Panics if a provided attribute's length does not equal
    /// `points.len()` (§7: mismatched attribute array lengths is a
    /// programmer error).
    pub fn new_with_attributes(
        points: Vec<Point3<f64>>,
        normals: Option<Vec<Vector3<f64>>>,
        colors: Option<Vec<Color>>,
    ) -> Self {
        if let Some(normals) = normals.as_ref() {
            assert_eq!(
                normals.len(),
                points.len(),
                "normals length must match points length"
            );
        }
        if let Some(colors) = colors.as_ref() {
            assert_eq!(
                colors.len(),
                points.len(),
                "colors length must match points length"
            );
        }
        Self {
            points,
            normals,
            colors,
        }
    }

    /// The points, in insertion order.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// The per-point normals, if any have been computed.
    pub fn normals(&self) -> Option<&[Vector3<f64>]> {
        self.normals.as_deref()
    }

    /// The per-point colors, if the cloud carries color.
    pub fn colors(&self) -> Option<&[Color]> {
        self.colors.as_deref()
    }

    /// The number of points in the cloud.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Applies a rigid transform to every point in place; normals are
    /// rotated but not translated.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Transform Point Cloud", skip_all)
    )]
    pub fn transform(&mut self, isometry: &Isometry3<f64>) {
        numeric::assert_rigid(isometry);
        for point in &mut self.points {
            *point = isometry.transform_point(point);
        }
        if let Some(normals) = self.normals.as_mut() {
            for normal in normals {
                *normal = isometry.rotation.transform_vector(normal);
            }
        }
    }

    /// Returns a transformed copy, leaving `self` untouched.
    pub fn transformed(&self, isometry: &Isometry3<f64>) -> Self {
        let mut copy = self.clone();
        copy.transform(isometry);
        copy
    }

    /// Concatenates `other` onto this cloud.
    ///
    /// # Panics
    /// Panics if exactly one of `self`/`other` carries normals (or colors)
    /// — appending would otherwise leave the attribute array shorter than
    /// `points`, violating the cloud's length invariant.
    #[cfg_attr(feature = "tracing", tracing::instrument("Append Point Cloud", skip_all))]
    pub fn append(&mut self, other: &PointCloud) {
        if other.is_empty() {
            return;
        }
        assert_eq!(
            self.normals.is_some(),
            other.normals.is_some(),
            "cannot append clouds with mismatched normal presence"
        );
        assert_eq!(
            self.colors.is_some(),
            other.colors.is_some(),
            "cannot append clouds with mismatched color presence"
        );

        self.points.extend_from_slice(&other.points);
        if let (Some(a), Some(b)) = (self.normals.as_mut(), other.normals.as_ref()) {
            a.extend_from_slice(b);
        }
        if let (Some(a), Some(b)) = (self.colors.as_mut(), other.colors.as_ref()) {
            a.extend_from_slice(b);
        }
    }

    /// Returns a new cloud containing only the given indices, in the order
    /// given. Out-of-range indices are skipped rather than panicking, since
    /// callers typically derive index lists from a cropping volume that has
    /// already bounds-checked against the same cloud.
    pub fn select_by_index(&self, indices: &[usize]) -> Self {
        let points = indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect();
        let normals = self.normals.as_ref().map(|normals| {
            indices
                .iter()
                .filter_map(|&i| normals.get(i).copied())
                .collect()
        });
        let colors = self.colors.as_ref().map(|colors| {
            indices
                .iter()
                .filter_map(|&i| colors.get(i).copied())
                .collect()
        });
        Self {
            points,
            normals,
            colors,
        }
    }

    /// Removes the given indices from the cloud in place, preserving the
    /// relative order of the remaining points.
    pub fn remove_indices(&mut self, indices: &std::collections::HashSet<usize>) {
        if indices.is_empty() {
            return;
        }
        let mut keep = (0..self.points.len()).filter(|i| !indices.contains(i));
        let kept_indices: Vec<usize> = (&mut keep).collect();
        *self = self.select_by_index(&kept_indices);
    }

    /// Voxel-downsamples the cloud: every occupied voxel is represented by
    /// the mean position (and mean normal/color, if present) of the points
    /// that fall inside it. Point order is not preserved.
    ///
    /// A non-positive `voxel_size` disables voxelization (§7) and returns a
    /// clone of `self` unchanged.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Voxel Downsample Point Cloud", skip_all)
    )]
    pub fn voxel_downsample(&self, voxel_size: f64) -> Self {
        if voxel_size <= 0.0 || self.is_empty() {
            return self.clone();
        }

        let mut buckets: HashMap<VoxelKey, Vec<usize>> = HashMap::new();
        for (index, point) in self.points.iter().enumerate() {
            buckets
                .entry(VoxelKey::from_point(point, voxel_size))
                .or_default()
                .push(index);
        }

        let mut points = Vec::with_capacity(buckets.len());
        let mut normals = self.normals.as_ref().map(|_| Vec::with_capacity(buckets.len()));
        let mut colors = self.colors.as_ref().map(|_| Vec::with_capacity(buckets.len()));

        for indices in buckets.into_values() {
            let n = indices.len() as f64;
            let mean_point = indices
                .iter()
                .fold(Vector3::zeros(), |acc, &i| acc + self.points[i].coords)
                / n;
            points.push(Point3::from(mean_point));

            if let (Some(dst), Some(src)) = (normals.as_mut(), self.normals.as_ref()) {
                let mean_normal = indices.iter().fold(Vector3::zeros(), |acc, &i| acc + src[i]) / n;
                dst.push(mean_normal);
            }
            if let (Some(dst), Some(src)) = (colors.as_mut(), self.colors.as_ref()) {
                let (r, g, b) = indices.iter().fold((0u32, 0u32, 0u32), |(r, g, b), &i| {
                    let [cr, cg, cb] = src[i];
                    (r + cr as u32, g + cg as u32, b + cb as u32)
                });
                let count = indices.len() as u32;
                dst.push([(r / count) as u8, (g / count) as u8, (b / count) as u8]);
            }
        }

        Self {
            points,
            normals,
            colors,
        }
    }

    /// Estimates a per-point normal by fitting a plane (via PCA) to each
    /// point's `knn` nearest neighbors.
    ///
    /// Points with fewer than 3 neighbors (including themselves) are left
    /// with a zero normal, since no plane can be fit (§4.1: "normal
    /// estimation on fewer than 3 points leaves normals unset for those
    /// points").
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Estimate Point Cloud Normals", skip_all)
    )]
    pub fn estimate_normals(&mut self, knn: usize) {
        if self.is_empty() {
            self.normals = Some(Vec::new());
            return;
        }

        let tree = KdTree::build(&self.points);
        let normals = self
            .points
            .iter()
            .map(|point| {
                let neighbors = tree.k_nearest(point, knn.max(3));
                if neighbors.len() < 3 {
                    return Vector3::zeros();
                }
                let neighbor_points: Vec<_> =
                    neighbors.iter().map(|n| self.points[n.index]).collect();
                plane_normal(&neighbor_points).unwrap_or_else(Vector3::zeros)
            })
            .collect();
        self.normals = Some(normals);
    }

    /// Estimates a per-point normal the same way as [`PointCloud::estimate_normals`],
    /// but over the hybrid radius-and-knn neighborhood used by place
    /// recognition: every neighbor within `radius`, extended with the
    /// closest remaining points up to `knn` if the radius search alone
    /// found fewer.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Estimate Point Cloud Normals (Hybrid)", skip_all)
    )]
    pub fn estimate_normals_hybrid(&mut self, radius: f64, knn: usize) {
        if self.is_empty() {
            self.normals = Some(Vec::new());
            return;
        }

        let tree = KdTree::build(&self.points);
        let normals = self
            .points
            .iter()
            .map(|point| {
                let neighbors = tree.hybrid_search(point, radius, knn.max(3));
                if neighbors.len() < 3 {
                    return Vector3::zeros();
                }
                let neighbor_points: Vec<_> =
                    neighbors.iter().map(|n| self.points[n.index]).collect();
                plane_normal(&neighbor_points).unwrap_or_else(Vector3::zeros)
            })
            .collect();
        self.normals = Some(normals);
    }

    /// Rescales every normal to unit length. Zero-length (unset) normals
    /// are left untouched to avoid producing `NaN`.
    pub fn normalize_normals(&mut self) {
        if let Some(normals) = self.normals.as_mut() {
            for normal in normals {
                let norm = normal.norm();
                if norm > f64::EPSILON {
                    *normal /= norm;
                }
            }
        }
    }

    /// Flips each normal's sign, if necessary, so it has a non-negative dot
    /// product with the vector from the point towards `camera_location`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Orient Normals Towards Camera", skip_all)
    )]
    pub fn orient_normals_towards_camera_location(&mut self, camera_location: Point3<f64>) {
        let points = &self.points;
        if let Some(normals) = self.normals.as_mut() {
            for (point, normal) in points.iter().zip(normals.iter_mut()) {
                let view_direction = camera_location - point;
                if normal.dot(&view_direction) < 0.0 {
                    *normal = -*normal;
                }
            }
        }
    }
}

/// Fits the best-fit plane through `points` (via the covariance matrix's
/// smallest-eigenvalue eigenvector) and returns its unit normal.
fn plane_normal(points: &[Point3<f64>]) -> Option<Vector3<f64>> {
    let cov = numeric::covariance(points)?;
    let eigen = SymmetricEigen::new(cov);
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())?;
    let normal = eigen.eigenvectors.column(min_idx).into_owned();
    let norm = normal.norm();
    if norm > f64::EPSILON {
        Some(normal / norm)
    } else {
        None
    }
}
