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

use nalgebra::Point3;

/// An integer lattice coordinate `(i, j, k)`, derived from a real point by
/// component-wise floor-division by a configured voxel size.
///
/// Two points fall in the same voxel iff their keys, computed with the same
/// `voxel_size`, are equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelKey {
    /// Lattice coordinate along X.
    pub i: i64,
    /// Lattice coordinate along Y.
    pub j: i64,
    /// Lattice coordinate along Z.
    pub k: i64,
}

impl VoxelKey {
    /// Builds a new key directly from lattice coordinates.
    #[inline]
    pub fn new(i: i64, j: i64, k: i64) -> Self {
        Self { i, j, k }
    }

    /// Computes the voxel key containing `point`, for a lattice of the given
    /// `voxel_size`.
    ///
    /// # Panics
    /// Panics if `voxel_size` is not finite and strictly positive; callers
    /// are expected to have already disabled voxelization for non-positive
    /// sizes rather than calling this function (see §7 of the spec: "zero or
    /// negative configured voxel size disables voxelization").
    #[inline]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Compute Voxel Key", skip_all, level = "trace")
    )]
    pub fn from_point(point: &Point3<f64>, voxel_size: f64) -> Self {
        assert!(
            voxel_size.is_finite() && voxel_size > 0.0,
            "voxel_size must be finite and positive, got {voxel_size}"
        );
        Self {
            i: (point.x / voxel_size).floor() as i64,
            j: (point.y / voxel_size).floor() as i64,
            k: (point.z / voxel_size).floor() as i64,
        }
    }

    /// Returns the 26-neighborhood of this key (all adjacent voxels, not
    /// including this one).
    pub fn neighbors_26(&self) -> impl Iterator<Item = VoxelKey> + '_ {
        (-1..=1).flat_map(move |di| {
            (-1..=1).flat_map(move |dj| {
                (-1..=1).filter_map(move |dk| {
                    if di == 0 && dj == 0 && dk == 0 {
                        None
                    } else {
                        Some(VoxelKey::new(self.i + di, self.j + dj, self.k + dk))
                    }
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_point() {
        let key = VoxelKey::from_point(&Point3::new(1.2, -0.3, 5.9), 1.0);
        assert_eq!(key, VoxelKey::new(1, -1, 5));
    }

    #[test]
    fn test_from_point_on_boundary() {
        let key = VoxelKey::from_point(&Point3::new(2.0, 2.0, 2.0), 1.0);
        assert_eq!(key, VoxelKey::new(2, 2, 2));
    }

    #[test]
    #[should_panic]
    fn test_from_point_zero_voxel_size_panics() {
        let _ = VoxelKey::from_point(&Point3::origin(), 0.0);
    }

    #[test]
    fn test_neighbors_26() {
        let key = VoxelKey::new(0, 0, 0);
        let neighbors: Vec<_> = key.neighbors_26().collect();
        assert_eq!(neighbors.len(), 26);
        assert!(!neighbors.contains(&key));
        assert!(neighbors.contains(&VoxelKey::new(1, 1, 1)));
        assert!(neighbors.contains(&VoxelKey::new(-1, 0, 0)));
    }
}
