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

use nalgebra::{Isometry3, Point3, Vector3};
use submap_geometry::{numeric, PointCloud, VoxelKey};

/// The running-mean attributes aggregated for a single occupied voxel.
#[derive(Clone, Copy, Debug)]
pub struct VoxelBucket {
    /// Number of points merged into this voxel so far.
    pub count: u64,
    /// Running mean position of the points merged into this voxel.
    pub position: Point3<f64>,
    /// Running mean normal, if the inserted clouds carried normals.
    pub normal: Option<Vector3<f64>>,
    /// Running mean color, if the inserted clouds carried color.
    pub color: Option<[f64; 3]>,
}

impl VoxelBucket {
    fn from_point(
        position: Point3<f64>,
        normal: Option<Vector3<f64>>,
        color: Option<[u8; 3]>,
    ) -> Self {
        Self {
            count: 1,
            position,
            normal,
            color: color.map(|[r, g, b]| [r as f64, g as f64, b as f64]),
        }
    }

    fn merge_point(
        &mut self,
        position: Point3<f64>,
        normal: Option<Vector3<f64>>,
        color: Option<[u8; 3]>,
    ) {
        self.count += 1;
        let n = self.count as f64;
        self.position += (position - self.position) / n;
        if let (Some(mean), Some(sample)) = (self.normal.as_mut(), normal) {
            *mean += (sample - *mean) / n;
        }
        if let (Some(mean), Some([r, g, b])) = (self.color.as_mut(), color) {
            mean[0] += (r as f64 - mean[0]) / n;
            mean[1] += (g as f64 - mean[1]) / n;
            mean[2] += (b as f64 - mean[2]) / n;
        }
    }

    fn merge_bucket(&mut self, other: &VoxelBucket) {
        let total = self.count + other.count;
        let w_self = self.count as f64 / total as f64;
        let w_other = other.count as f64 / total as f64;
        self.position = Point3::from(self.position.coords * w_self + other.position.coords * w_other);
        self.normal = match (self.normal, other.normal) {
            (Some(a), Some(b)) => Some(a * w_self + b * w_other),
            (a, b) => a.or(b),
        };
        self.color = match (self.color, other.color) {
            (Some(a), Some(b)) => Some([
                a[0] * w_self + b[0] * w_other,
                a[1] * w_self + b[1] * w_other,
                a[2] * w_self + b[2] * w_other,
            ]),
            (a, b) => a.or(b),
        };
        self.count = total;
    }
}

/// A dense voxel grid mapping voxel key to aggregated point attributes
/// (running mean of position, normal, and color).
#[derive(Clone, Debug)]
pub struct VoxelizedCloud {
    voxel_size: f64,
    buckets: HashMap<VoxelKey, VoxelBucket>,
    unkeyed_counter: i64,
}

impl VoxelizedCloud {
    /// Builds an empty voxel grid of the given voxel size.
    ///
    /// A non-positive `voxel_size` disables voxelization (§7): every
    /// inserted point is kept in its own bucket instead of being merged.
    pub fn new(voxel_size: f64) -> Self {
        Self {
            voxel_size,
            buckets: HashMap::new(),
            unkeyed_counter: 0,
        }
    }

    /// The voxel size this grid was constructed with.
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Whether the grid holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The number of occupied voxels.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    fn key_for(&mut self, point: &Point3<f64>) -> VoxelKey {
        if self.voxel_size > 0.0 {
            VoxelKey::from_point(point, self.voxel_size)
        } else {
            self.unkeyed_counter += 1;
            VoxelKey::new(self.unkeyed_counter, 0, 0)
        }
    }

    /// Iterates `cloud`'s points, merging each into the bucket for its
    /// voxel key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Insert Cloud Into Voxel Grid", skip_all)
    )]
    pub fn insert(&mut self, cloud: &PointCloud) {
        for (index, point) in cloud.points().iter().enumerate() {
            let normal = cloud.normals().map(|normals| normals[index]);
            let color = cloud.colors().map(|colors| colors[index]);
            let key = self.key_for(point);
            self.buckets
                .entry(key)
                .and_modify(|bucket| bucket.merge_point(*point, normal, color))
                .or_insert_with(|| VoxelBucket::from_point(*point, normal, color));
        }
    }

    /// Removes the bucket at `key`, if present.
    pub fn remove_key(&mut self, key: &VoxelKey) -> bool {
        self.buckets.remove(key).is_some()
    }

    /// Rigid-transforms every bucket's aggregated position (and normal),
    /// then rebuilds the key index from the new positions so no bucket's
    /// representative straddles its old voxel boundary.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Transform Voxel Grid", skip_all)
    )]
    pub fn transform(&mut self, isometry: &Isometry3<f64>) {
        numeric::assert_rigid(isometry);
        let old_buckets = std::mem::take(&mut self.buckets);
        for (_, mut bucket) in old_buckets {
            bucket.position = isometry.transform_point(&bucket.position);
            bucket.normal = bucket
                .normal
                .map(|normal| isometry.rotation.transform_vector(&normal));

            let new_key = if self.voxel_size > 0.0 {
                VoxelKey::from_point(&bucket.position, self.voxel_size)
            } else {
                self.unkeyed_counter += 1;
                VoxelKey::new(self.unkeyed_counter, 0, 0)
            };
            self.buckets
                .entry(new_key)
                .and_modify(|existing| existing.merge_bucket(&bucket))
                .or_insert(bucket);
        }
    }

    /// Iterates the occupied voxels and their aggregated attributes.
    pub fn entries(&self) -> impl Iterator<Item = (&VoxelKey, &VoxelBucket)> {
        self.buckets.iter()
    }

    /// Returns a flat point cloud built from each occupied voxel's mean
    /// position (and mean normal/color, if tracked).
    pub fn to_point_cloud(&self) -> PointCloud {
        let points: Vec<_> = self.buckets.values().map(|bucket| bucket.position).collect();
        let normals = if self.buckets.values().all(|b| b.normal.is_some()) && !self.buckets.is_empty() {
            Some(self.buckets.values().map(|b| b.normal.unwrap()).collect())
        } else {
            None
        };
        let colors = if self.buckets.values().all(|b| b.color.is_some()) && !self.buckets.is_empty() {
            Some(
                self.buckets
                    .values()
                    .map(|b| {
                        let [r, g, b] = b.color.unwrap();
                        [r.round() as u8, g.round() as u8, b.round() as u8]
                    })
                    .collect(),
            )
        } else {
            None
        };
        PointCloud::new_with_attributes(points, normals, colors)
    }
}
