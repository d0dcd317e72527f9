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

use nalgebra::{DMatrix, Point3};
use submap_geometry::{KdTree, PointCloud};

use crate::parameters::PlaceRecognitionParameters;

/// Number of bins used for each of the three SPFH angular histograms; the
/// concatenation of the three gives the 33-dimensional descriptor.
const HISTOGRAM_BINS: usize = 11;
/// Length of one feature descriptor (`3 * HISTOGRAM_BINS`).
pub const DESCRIPTOR_LEN: usize = 3 * HISTOGRAM_BINS;

/// The output of [`compute`]: a sparse, normal-oriented point cloud paired
/// with one 33-dimensional descriptor row per point.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    /// The sparse (feature-voxel-downsampled) cloud the descriptors were
    /// computed over.
    pub sparse_cloud: PointCloud,
    /// A `(sparse_cloud.len(), 33)` matrix of FPFH-family descriptors.
    pub descriptors: DMatrix<f64>,
}

/// Runs the full C6 pipeline over a world-frame cloud: voxel-downsample,
/// hybrid normal estimation, normalization, orientation toward the world
/// origin, and FPFH descriptor computation.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument("Compute Place Recognition Features", skip_all)
)]
pub fn compute(cloud: &PointCloud, params: &PlaceRecognitionParameters) -> FeatureSet {
    let mut sparse_cloud = cloud.voxel_downsample(params.feature_voxel_size);
    sparse_cloud.estimate_normals_hybrid(params.normal_estimation_radius, params.normal_knn);
    sparse_cloud.normalize_normals();
    sparse_cloud.orient_normals_towards_camera_location(Point3::origin());

    let descriptors = compute_fpfh(&sparse_cloud, params.feature_radius, params.feature_knn);
    FeatureSet {
        sparse_cloud,
        descriptors,
    }
}

/// Bins a value in `[lo, hi]` into `HISTOGRAM_BINS` equal-width buckets,
/// clamping out-of-range inputs into the first/last bin.
fn bin_index(value: f64, lo: f64, hi: f64) -> usize {
    let fraction = ((value - lo) / (hi - lo)).clamp(0.0, 0.999_999_999);
    (fraction * HISTOGRAM_BINS as f64) as usize
}

/// Computes the Simplified Point Feature Histogram for `index` against its
/// `neighbor_indices`, following the classic PFH angular triplet
/// `(alpha, phi, theta)` per neighbor pair.
fn simplified_pfh(
    points: &[Point3<f64>],
    normals: &[nalgebra::Vector3<f64>],
    index: usize,
    neighbor_indices: &[usize],
) -> [f64; DESCRIPTOR_LEN] {
    let mut histogram = [0.0f64; DESCRIPTOR_LEN];
    let p_i = points[index];
    let n_i = normals[index];
    if n_i.norm() <= f64::EPSILON || neighbor_indices.is_empty() {
        return histogram;
    }

    let mut counted = 0usize;
    for &j in neighbor_indices {
        if j == index {
            continue;
        }
        let p_j = points[j];
        let n_j = normals[j];
        let delta = p_j - p_i;
        let dist = delta.norm();
        if dist <= f64::EPSILON {
            continue;
        }

        let u = n_i;
        let d_unit = delta / dist;
        let v = d_unit.cross(&u);
        let v_norm = v.norm();
        if v_norm <= f64::EPSILON {
            continue;
        }
        let v = v / v_norm;
        let w = u.cross(&v);

        let alpha = v.dot(&n_j);
        let phi = u.dot(&d_unit);
        let theta = w.dot(&n_j).atan2(u.dot(&n_j));

        histogram[bin_index(alpha, -1.0, 1.0)] += 1.0;
        histogram[HISTOGRAM_BINS + bin_index(phi, -1.0, 1.0)] += 1.0;
        histogram[2 * HISTOGRAM_BINS + bin_index(theta, -std::f64::consts::PI, std::f64::consts::PI)] +=
            1.0;
        counted += 1;
    }

    if counted > 0 {
        normalize_blocks(&mut histogram);
    }
    histogram
}

fn normalize_blocks(histogram: &mut [f64; DESCRIPTOR_LEN]) {
    for block in histogram.chunks_mut(HISTOGRAM_BINS) {
        let sum: f64 = block.iter().sum();
        if sum > f64::EPSILON {
            for bin in block.iter_mut() {
                *bin /= sum;
            }
        }
    }
}

/// Computes the fast point feature histogram for every point of `cloud`:
/// each point's own SPFH, refined by a distance-weighted average of its
/// neighbors' SPFH values (the "fast" step of FPFH).
fn compute_fpfh(cloud: &PointCloud, radius: f64, knn: usize) -> DMatrix<f64> {
    let n = cloud.len();
    if n == 0 {
        return DMatrix::zeros(0, DESCRIPTOR_LEN);
    }

    let points = cloud.points();
    let normals = cloud
        .normals()
        .map(|normals| normals.to_vec())
        .unwrap_or_else(|| vec![nalgebra::Vector3::zeros(); n]);

    let tree = KdTree::build(points);
    let neighborhoods: Vec<Vec<_>> = points
        .iter()
        .map(|point| tree.hybrid_search(point, radius, knn))
        .collect();

    let spfh: Vec<[f64; DESCRIPTOR_LEN]> = (0..n)
        .map(|i| {
            let neighbor_indices: Vec<usize> =
                neighborhoods[i].iter().map(|neighbor| neighbor.index).collect();
            simplified_pfh(points, &normals, i, &neighbor_indices)
        })
        .collect();

    let mut rows = Vec::with_capacity(n * DESCRIPTOR_LEN);
    for i in 0..n {
        let neighbors = &neighborhoods[i];
        let mut fpfh = spfh[i];
        if !neighbors.is_empty() {
            let mut weighted_sum = [0.0f64; DESCRIPTOR_LEN];
            for neighbor in neighbors {
                let dist = neighbor.distance_sq.sqrt().max(f64::EPSILON);
                for (slot, value) in weighted_sum.iter_mut().zip(spfh[neighbor.index].iter()) {
                    *slot += value / dist;
                }
            }
            let weight = 1.0 / neighbors.len() as f64;
            for (f, w) in fpfh.iter_mut().zip(weighted_sum.iter()) {
                *f += weight * w;
            }
            normalize_blocks(&mut fpfh);
        }
        rows.extend_from_slice(&fpfh);
    }

    DMatrix::from_row_slice(n, DESCRIPTOR_LEN, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_cloud(spacing: f64, half_extent: i32) -> PointCloud {
        let mut points = Vec::new();
        for x in -half_extent..=half_extent {
            for y in -half_extent..=half_extent {
                points.push(Point3::new(x as f64 * spacing, y as f64 * spacing, 0.0));
            }
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn test_compute_on_empty_cloud_returns_empty_output() {
        let output = compute(&PointCloud::new(), &PlaceRecognitionParameters::default());
        assert!(output.sparse_cloud.is_empty());
        assert_eq!(output.descriptors.nrows(), 0);
        assert_eq!(output.descriptors.ncols(), DESCRIPTOR_LEN);
    }

    #[test]
    fn test_compute_descriptor_shape_matches_sparse_cloud() {
        let cloud = plane_cloud(0.1, 4);
        let params = PlaceRecognitionParameters {
            feature_voxel_size: 0.15,
            normal_estimation_radius: 0.3,
            normal_knn: 10,
            feature_radius: 0.4,
            feature_knn: 15,
        };
        let output = compute(&cloud, &params);
        assert_eq!(output.descriptors.nrows(), output.sparse_cloud.len());
        assert_eq!(output.descriptors.ncols(), DESCRIPTOR_LEN);
    }

    #[test]
    fn test_compute_is_idempotent_on_unchanged_input() {
        let cloud = plane_cloud(0.1, 3);
        let params = PlaceRecognitionParameters {
            feature_voxel_size: 0.15,
            normal_estimation_radius: 0.3,
            normal_knn: 8,
            feature_radius: 0.4,
            feature_knn: 12,
        };
        let first = compute(&cloud, &params);
        let second = compute(&cloud, &params);
        assert_eq!(first.sparse_cloud.len(), second.sparse_cloud.len());
        assert_eq!(first.descriptors.nrows(), second.descriptors.nrows());

        let sum_abs = |m: &DMatrix<f64>| m.iter().map(|v| v.abs()).sum::<f64>();
        assert!((sum_abs(&first.descriptors) - sum_abs(&second.descriptors)).abs() < 1e-6);
    }

    #[test]
    fn test_histogram_blocks_sum_to_one_when_neighbors_exist() {
        let cloud = plane_cloud(0.1, 4);
        let params = PlaceRecognitionParameters {
            feature_voxel_size: 0.1,
            normal_estimation_radius: 0.3,
            normal_knn: 10,
            feature_radius: 0.35,
            feature_knn: 12,
        };
        let output = compute(&cloud, &params);
        for row in output.descriptors.row_iter() {
            let values: Vec<f64> = row.iter().copied().collect();
            for block in values.chunks(HISTOGRAM_BINS) {
                let sum: f64 = block.iter().sum();
                assert!(sum <= 1.0 + 1e-6);
            }
        }
    }
}
