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

use std::collections::{HashMap, HashSet};

use submap_geometry::{PointCloud, VoxelKey};

/// A sparse index from voxel key to the set of indices of a referenced
/// [`PointCloud`] that fall in that voxel, used for adjacency queries
/// (e.g. "which map points neighbor this candidate").
///
/// Built with a voxel size equal to `mapBuilderVoxelSize * expansionFactor`
/// so that adjacency queries tolerate small positional drift between the
/// index and the cloud it was built from.
#[derive(Clone, Debug)]
pub struct VoxelMap {
    voxel_size: f64,
    layers: HashMap<String, HashMap<VoxelKey, HashSet<usize>>>,
}

impl VoxelMap {
    /// Builds an empty index at the given (already-expanded) voxel size.
    pub fn new(voxel_size: f64) -> Self {
        Self {
            voxel_size,
            layers: HashMap::new(),
        }
    }

    /// The voxel size this index was built with.
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Drops every layer.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Whether any layer holds any indexed point.
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(|layer| layer.is_empty())
    }

    /// Indexes every point of `cloud` under `layer`, keyed by its voxel.
    /// Does not clear the layer first; call [`VoxelMap::clear`] for a full
    /// rebuild.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Insert Cloud Into Sparse Voxel Index", skip_all)
    )]
    pub fn insert_cloud(&mut self, layer: &str, cloud: &PointCloud) {
        if self.voxel_size <= 0.0 {
            return;
        }
        let bucket = self.layers.entry(layer.to_string()).or_default();
        for (index, point) in cloud.points().iter().enumerate() {
            bucket
                .entry(VoxelKey::from_point(point, self.voxel_size))
                .or_default()
                .insert(index);
        }
    }

    /// The 26-neighborhood of `key`, regardless of occupancy.
    pub fn keys_near(&self, key: &VoxelKey) -> Vec<VoxelKey> {
        key.neighbors_26().collect()
    }

    /// The union of point indices stored at `key` and its 26-neighborhood,
    /// within `layer`.
    pub fn indices_near(&self, layer: &str, key: &VoxelKey) -> HashSet<usize> {
        let Some(bucket) = self.layers.get(layer) else {
            return HashSet::new();
        };
        let mut out = bucket.get(key).cloned().unwrap_or_default();
        for neighbor in key.neighbors_26() {
            if let Some(indices) = bucket.get(&neighbor) {
                out.extend(indices);
            }
        }
        out
    }

    /// The number of layers currently indexed.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
