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

use nalgebra::{Isometry3, Point3, Vector3};
use submap_geometry::{KdTree, PointCloud, VoxelKey};

use crate::cropping::CroppingVolume;
use crate::dense_voxel_cloud::VoxelizedCloud;

/// Configuration for a single space-carving pass (either the point-cloud
/// or the voxel variant share the same parameter shape).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CarvingParameters {
    /// Candidates farther than this from the sensor are never carved.
    pub max_range_to_drop: f64,
    /// Radius (in meters) within which a marched ray sample must find a
    /// real scan return to count as "a surface was seen here".
    pub voxel_size_ray: f64,
    /// Metric step length used when marching a ray towards a candidate.
    pub step_size: f64,
    /// Minimum `dot(view_direction, -normal)` required to carve a point
    /// that carries a normal; ignored for points without one.
    pub min_dot_threshold_for_dropping: f64,
    /// Minimum interval, in nanoseconds, between two carve passes against
    /// the same target.
    pub carve_space_every_nsec: u64,
}

impl Default for CarvingParameters {
    fn default() -> Self {
        Self {
            max_range_to_drop: 30.0,
            voxel_size_ray: 0.1,
            step_size: 0.05,
            min_dot_threshold_for_dropping: 0.2,
            carve_space_every_nsec: 1_000_000_000,
        }
    }
}

/// Gates a carve target's timer: a carve against a given target is a no-op
/// unless its configured interval has elapsed since the last successful
/// carve against that same target.
#[derive(Clone, Copy, Debug, Default)]
pub struct CarveTimer {
    last_carve_nanos: Option<u64>,
}

impl CarveTimer {
    /// A timer that has never fired; the next call is always due.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a carve is due at `now_nanos`, given `interval_nanos`.
    pub fn is_due(&self, now_nanos: u64, interval_nanos: u64) -> bool {
        match self.last_carve_nanos {
            None => true,
            Some(last) => now_nanos.saturating_sub(last) >= interval_nanos,
        }
    }

    /// Records that a carve ran at `now_nanos`.
    pub fn reset(&mut self, now_nanos: u64) {
        self.last_carve_nanos = Some(now_nanos);
    }
}

/// Walks the ray from `origin` to `candidate` in `step_size` increments,
/// stopping just short of `candidate` itself, and reports whether a real
/// scan return was found within `tolerance` of any sampled point — i.e.
/// whether the fresh scan proves a surface exists strictly closer to the
/// sensor than `candidate` along (approximately) the same bearing.
fn ray_reveals_closer_surface(
    origin: Point3<f64>,
    candidate: Point3<f64>,
    scan_tree: &KdTree,
    step_size: f64,
    tolerance: f64,
) -> bool {
    if step_size <= 0.0 || tolerance <= 0.0 {
        return false;
    }
    let direction = candidate - origin;
    let range = direction.norm();
    if range <= step_size {
        return false;
    }
    let unit = direction / range;

    let mut travelled = step_size;
    while travelled < range - tolerance {
        let sample = origin + unit * travelled;
        if let Some(nearest) = scan_tree.nearest(&sample) {
            if nearest.distance_sq.sqrt() <= tolerance {
                return true;
            }
        }
        travelled += step_size;
    }
    false
}

fn passes_normal_gate(
    normal: Option<Vector3<f64>>,
    sensor_origin: Point3<f64>,
    point: Point3<f64>,
    min_dot_threshold: f64,
) -> bool {
    match normal {
        None => true,
        Some(normal) => {
            let view_direction = (point - sensor_origin).normalize();
            (-view_direction).dot(&normal) >= min_dot_threshold
        }
    }
}

/// The result of a carve pass: the indices/keys removed, and whether the
/// pass actually ran (as opposed to being gated out as a no-op).
#[derive(Clone, Debug, Default)]
pub struct CarveOutcome<K> {
    /// The candidates that were carved (removed).
    pub removed: Vec<K>,
    /// Whether the carve actually evaluated candidates (`false` means the
    /// timer had not yet elapsed, or the target was empty).
    pub ran: bool,
}

/// Point-cloud space carving (C5, variant 1): identifies indices of
/// `target` that a fresh scan proves are no longer occupied, because the
/// scan reveals real geometry strictly closer to the sensor along
/// (approximately) the same ray.
#[cfg_attr(feature = "tracing", tracing::instrument("Carve Point Cloud", skip_all))]
pub fn carve_point_cloud(
    raw_scan: &PointCloud,
    sensor_pose: &Isometry3<f64>,
    cropping: &CroppingVolume,
    params: &CarvingParameters,
    target: &PointCloud,
    timer: &mut CarveTimer,
    now_nanos: u64,
) -> CarveOutcome<usize> {
    if target.is_empty() || !timer.is_due(now_nanos, params.carve_space_every_nsec) {
        return CarveOutcome::default();
    }

    let scan_world = raw_scan.transformed(sensor_pose);
    let sensor_origin: Point3<f64> = sensor_pose.translation.vector.into();
    let scan_tree = KdTree::build(scan_world.points());

    let candidates = cropping.indices_within(target);
    let mut removed = Vec::new();
    for index in candidates {
        let point = target.points()[index];
        let range = (point - sensor_origin).norm();
        if range > params.max_range_to_drop {
            continue;
        }
        if !ray_reveals_closer_surface(
            sensor_origin,
            point,
            &scan_tree,
            params.step_size,
            params.voxel_size_ray,
        ) {
            continue;
        }
        let normal = target.normals().map(|normals| normals[index]);
        if !passes_normal_gate(
            normal,
            sensor_origin,
            point,
            params.min_dot_threshold_for_dropping,
        ) {
            continue;
        }
        removed.push(index);
    }

    timer.reset(now_nanos);
    CarveOutcome { removed, ran: true }
}

/// Voxel-grid space carving (C5, variant 2): identifies keys of `target`
/// that a fresh scan proves are no longer occupied, by the same ray-reveal
/// logic as [`carve_point_cloud`] applied to each voxel's representative
/// position.
#[cfg_attr(feature = "tracing", tracing::instrument("Carve Voxel Grid", skip_all))]
pub fn carve_voxel_cloud(
    raw_scan: &PointCloud,
    sensor_pose: &Isometry3<f64>,
    cropping: &CroppingVolume,
    params: &CarvingParameters,
    target: &VoxelizedCloud,
    timer: &mut CarveTimer,
    now_nanos: u64,
) -> CarveOutcome<VoxelKey> {
    if target.is_empty() || !timer.is_due(now_nanos, params.carve_space_every_nsec) {
        return CarveOutcome::default();
    }

    let scan_world = raw_scan.transformed(sensor_pose);
    let sensor_origin: Point3<f64> = sensor_pose.translation.vector.into();
    let scan_tree = KdTree::build(scan_world.points());

    let mut removed = Vec::new();
    for (key, bucket) in target.entries() {
        if !cropping.contains(&bucket.position) {
            continue;
        }
        let range = (bucket.position - sensor_origin).norm();
        if range > params.max_range_to_drop {
            continue;
        }
        if !ray_reveals_closer_surface(
            sensor_origin,
            bucket.position,
            &scan_tree,
            params.step_size,
            params.voxel_size_ray,
        ) {
            continue;
        }
        if !passes_normal_gate(
            bucket.normal,
            sensor_origin,
            bucket.position,
            params.min_dot_threshold_for_dropping,
        ) {
            continue;
        }
        removed.push(*key);
    }

    timer.reset(now_nanos);
    CarveOutcome { removed, ran: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cropping::CropperKind;

    fn sensor_at_origin_cropper() -> CroppingVolume {
        CroppingVolume::new(CropperKind::MaxRadius, 100.0, -100.0, 100.0)
    }

    #[test]
    fn test_carve_is_noop_on_empty_target() {
        let mut timer = CarveTimer::new();
        let outcome = carve_point_cloud(
            &PointCloud::new(),
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &CarvingParameters::default(),
            &PointCloud::new(),
            &mut timer,
            0,
        );
        assert!(!outcome.ran);
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn test_carve_is_gated_by_timer() {
        let params = CarvingParameters {
            carve_space_every_nsec: 1_000_000_000,
            ..Default::default()
        };
        let target = PointCloud::from_points(vec![Point3::new(5.0, 0.0, 0.0)]);
        let scan = PointCloud::from_points(vec![Point3::new(3.0, 0.0, 0.0)]);
        let mut timer = CarveTimer::new();

        let first = carve_point_cloud(
            &scan,
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &params,
            &target,
            &mut timer,
            0,
        );
        assert!(first.ran);

        let second = carve_point_cloud(
            &scan,
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &params,
            &target,
            &mut timer,
            500_000_000,
        );
        assert!(!second.ran);
    }

    #[test]
    fn test_carve_removes_point_occluded_by_closer_return() {
        let params = CarvingParameters {
            max_range_to_drop: 30.0,
            voxel_size_ray: 0.2,
            step_size: 0.05,
            min_dot_threshold_for_dropping: 0.2,
            carve_space_every_nsec: 0,
        };
        let target = PointCloud::from_points(vec![Point3::new(5.0, 0.0, 0.0)]);
        let scan = PointCloud::from_points(vec![Point3::new(3.0, 0.0, 0.0)]);
        let mut timer = CarveTimer::new();

        let outcome = carve_point_cloud(
            &scan,
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &params,
            &target,
            &mut timer,
            0,
        );
        assert_eq!(outcome.removed, vec![0]);
    }

    #[test]
    fn test_carve_disabled_leaves_point_when_no_timer_call() {
        // Simulates "carving disabled": the caller simply never invokes
        // carve_point_cloud, so the target is untouched by construction.
        let target = PointCloud::from_points(vec![Point3::new(5.0, 0.0, 0.0)]);
        assert_eq!(target.points(), &[Point3::new(5.0, 0.0, 0.0)]);
    }

    #[test]
    fn test_carve_leaves_point_beyond_max_range_untouched() {
        let params = CarvingParameters {
            max_range_to_drop: 1.0,
            voxel_size_ray: 0.2,
            step_size: 0.05,
            min_dot_threshold_for_dropping: 0.2,
            carve_space_every_nsec: 0,
        };
        let target = PointCloud::from_points(vec![Point3::new(5.0, 0.0, 0.0)]);
        let scan = PointCloud::from_points(vec![Point3::new(3.0, 0.0, 0.0)]);
        let mut timer = CarveTimer::new();

        let outcome = carve_point_cloud(
            &scan,
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &params,
            &target,
            &mut timer,
            0,
        );
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn test_carve_skips_when_normal_faces_away_from_sensor() {
        let params = CarvingParameters {
            max_range_to_drop: 30.0,
            voxel_size_ray: 0.2,
            step_size: 0.05,
            min_dot_threshold_for_dropping: 0.9,
            carve_space_every_nsec: 0,
        };
        let target = PointCloud::new_with_attributes(
            vec![Point3::new(5.0, 0.0, 0.0)],
            Some(vec![Vector3::new(1.0, 0.0, 0.0)]), // faces away from the sensor
            None,
        );
        let scan = PointCloud::from_points(vec![Point3::new(3.0, 0.0, 0.0)]);
        let mut timer = CarveTimer::new();

        let outcome = carve_point_cloud(
            &scan,
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &params,
            &target,
            &mut timer,
            0,
        );
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn test_carve_voxel_cloud_removes_matching_bucket() {
        let params = CarvingParameters {
            max_range_to_drop: 30.0,
            voxel_size_ray: 0.2,
            step_size: 0.05,
            min_dot_threshold_for_dropping: 0.2,
            carve_space_every_nsec: 0,
        };
        let mut dense = VoxelizedCloud::new(1.0);
        dense.insert(&PointCloud::from_points(vec![Point3::new(5.0, 0.0, 0.0)]));
        let scan = PointCloud::from_points(vec![Point3::new(3.0, 0.0, 0.0)]);
        let mut timer = CarveTimer::new();

        let outcome = carve_voxel_cloud(
            &scan,
            &Isometry3::identity(),
            &sensor_at_origin_cropper(),
            &params,
            &dense,
            &mut timer,
            0,
        );
        assert_eq!(outcome.removed.len(), 1);
    }
}
