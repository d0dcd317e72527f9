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

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use nalgebra::{Isometry3, Point3};
use submap_geometry::{numeric, PointCloud};

use crate::cropping::CroppingVolume;
use crate::dense_voxel_cloud::VoxelizedCloud;
use crate::feature_extractor::{self, FeatureSet};
use crate::parameters::MapperParameters;
use crate::space_carving::{carve_point_cloud, carve_voxel_cloud, CarveTimer};
use crate::voxel_index::VoxelMap;

/// The voxel size used by the sparse index (C4) is the corresponding
/// builder's map voxel size multiplied by this factor, giving adjacency
/// queries some tolerance for positional drift.
const VOXEL_INDEX_EXPANSION_FACTOR: f64 = 2.0;

/// The named layer the sparse voxel index is rebuilt under during
/// `computeFeatures`.
const VOXEL_INDEX_MAP_LAYER: &str = "map";

struct MapState {
    map_cloud: PointCloud,
    sparse_map_cloud: PointCloud,
    submap_center: Point3<f64>,
    submap_center_computed: bool,
    map_to_submap: Isometry3<f64>,
    map_to_range_sensor: Isometry3<f64>,
    creation_time: Option<u64>,
    cropper: CroppingVolume,
    carve_timer: CarveTimer,
}

struct DenseState {
    dense_map: VoxelizedCloud,
    cropper: CroppingVolume,
    carve_timer: CarveTimer,
}

/// Tracks a rolling average of carve execution time, reporting it (and a
/// derived frequency) via the log every time 20 seconds of wall time have
/// accumulated since the last report.
struct CarveTelemetry {
    window_start: Instant,
    accumulated: Duration,
    count: u32,
}

impl CarveTelemetry {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            accumulated: Duration::ZERO,
            count: 0,
        }
    }

    fn record(&mut self, duration: Duration) {
        self.accumulated += duration;
        self.count += 1;
        if self.window_start.elapsed() >= Duration::from_secs(20) {
            let avg_ms = self.accumulated.as_secs_f64() * 1000.0 / self.count as f64;
            let frequency_hz = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
            log::info!(
                "Space carving timing stats: Avg execution time: {avg_ms} msec , frequency: {frequency_hz} Hz"
            );
            self.accumulated = Duration::ZERO;
            self.count = 0;
            self.window_start = Instant::now();
        }
    }
}

/// A reference into a `Submap`'s working map cloud, held behind its mutex
/// for the duration of the borrow. Dereferences to the cloud itself.
pub struct MapCloudRef<'a>(MutexGuard<'a, MapState>);

impl Deref for MapCloudRef<'_> {
    type Target = PointCloud;
    fn deref(&self) -> &PointCloud {
        &self.0.map_cloud
    }
}

/// A reference into a `Submap`'s sparse (feature) cloud, held behind its
/// mutex for the duration of the borrow.
pub struct SparseMapCloudRef<'a>(MutexGuard<'a, MapState>);

impl Deref for SparseMapCloudRef<'_> {
    type Target = PointCloud;
    fn deref(&self) -> &PointCloud {
        &self.0.sparse_map_cloud
    }
}

/// A reference into a `Submap`'s dense voxel map, held behind its mutex for
/// the duration of the borrow.
pub struct DenseMapRef<'a>(MutexGuard<'a, DenseState>);

impl Deref for DenseMapRef<'_> {
    type Target = VoxelizedCloud;
    fn deref(&self) -> &VoxelizedCloud {
        &self.0.dense_map
    }
}

/// A reference into a `Submap`'s sparse voxel index, held behind its mutex
/// for the duration of the borrow.
pub struct VoxelMapRef<'a>(MutexGuard<'a, VoxelMap>);

impl Deref for VoxelMapRef<'_> {
    type Target = VoxelMap;
    fn deref(&self) -> &VoxelMap {
        &self.0
    }
}

/// Orchestrator owning a submap's clouds, spatial indices, and lifecycle
/// (C7). Integrates scans, runs space carving and place-recognition
/// feature computation, and enforces the cross-representation invariants
/// and concurrency discipline an outer SLAM pipeline depends on.
pub struct Submap {
    id: u64,
    parent_id: u64,
    params: Mutex<MapperParameters>,
    map_state: Mutex<MapState>,
    dense_state: Mutex<DenseState>,
    voxel_map: Mutex<VoxelMap>,
    features: Mutex<Option<FeatureSet>>,
    last_feature_compute: Mutex<Option<Instant>>,
    carve_telemetry: Mutex<CarveTelemetry>,
}

impl Submap {
    /// Creates an empty submap with the given identity and parameters.
    pub fn new(id: u64, parent_id: u64, params: MapperParameters) -> Self {
        let map_cropper = params.map_builder.cropper.build_volume();
        let dense_cropper = params.dense_map_builder.cropper.build_volume();
        let dense_map = VoxelizedCloud::new(params.dense_map_builder.map_voxel_size);
        let voxel_map = VoxelMap::new(params.map_builder.map_voxel_size * VOXEL_INDEX_EXPANSION_FACTOR);

        Self {
            id,
            parent_id,
            params: Mutex::new(params),
            map_state: Mutex::new(MapState {
                map_cloud: PointCloud::new(),
                sparse_map_cloud: PointCloud::new(),
                submap_center: Point3::origin(),
                submap_center_computed: false,
                map_to_submap: Isometry3::identity(),
                map_to_range_sensor: Isometry3::identity(),
                creation_time: None,
                cropper: map_cropper,
                carve_timer: CarveTimer::new(),
            }),
            dense_state: Mutex::new(DenseState {
                dense_map,
                cropper: dense_cropper,
                carve_timer: CarveTimer::new(),
            }),
            voxel_map: Mutex::new(voxel_map),
            features: Mutex::new(None),
            last_feature_compute: Mutex::new(None),
            carve_telemetry: Mutex::new(CarveTelemetry::new()),
        }
    }

    /// The submap's own identifier.
    pub fn get_id(&self) -> u64 {
        self.id
    }

    /// The identifier of the submap this one was spawned from.
    pub fn get_parent_id(&self) -> u64 {
        self.parent_id
    }

    /// The submap's origin transform, submap-origin in world frame.
    pub fn get_map_to_submap_origin(&self) -> Isometry3<f64> {
        self.map_state.lock().unwrap().map_to_submap
    }

    /// The cached submap centroid if [`Submap::compute_submap_center`] has
    /// been called since the last structural change, else the submap
    /// origin's translation.
    pub fn get_map_to_submap_center(&self) -> Point3<f64> {
        let state = self.map_state.lock().unwrap();
        if state.submap_center_computed {
            state.submap_center
        } else {
            Point3::from(state.map_to_submap.translation.vector)
        }
    }

    /// A held-mutex reference to the working map cloud. Holding it blocks
    /// the mapping thread; prefer [`Submap::get_map_point_cloud_copy`] for
    /// anything longer-lived than a single read.
    pub fn get_map_point_cloud(&self) -> MapCloudRef<'_> {
        MapCloudRef(self.map_state.lock().unwrap())
    }

    /// A deep copy of the working map cloud, taken under lock.
    pub fn get_map_point_cloud_copy(&self) -> PointCloud {
        self.map_state.lock().unwrap().map_cloud.clone()
    }

    /// A held-mutex reference to the dense voxel map.
    pub fn get_dense_map(&self) -> DenseMapRef<'_> {
        DenseMapRef(self.dense_state.lock().unwrap())
    }

    /// A deep copy of the dense voxel map's flattened point cloud, taken
    /// under lock.
    pub fn get_dense_map_copy(&self) -> PointCloud {
        self.dense_state.lock().unwrap().dense_map.to_point_cloud()
    }

    /// A held-mutex reference to the sparse (feature) cloud.
    pub fn get_sparse_map_point_cloud(&self) -> SparseMapCloudRef<'_> {
        SparseMapCloudRef(self.map_state.lock().unwrap())
    }

    /// The descriptors computed by the last [`Submap::compute_features`]
    /// call.
    ///
    /// # Panics
    /// Panics if `compute_features` has never been called (§7: retrieving
    /// features before they are computed is a programmer error).
    pub fn get_features(&self) -> FeatureSet {
        let guard = self.features.lock().unwrap();
        guard
            .clone()
            .expect("features have not been computed yet; call compute_features first")
    }

    /// A held-mutex reference to the sparse voxel index.
    pub fn get_voxel_map(&self) -> VoxelMapRef<'_> {
        VoxelMapRef(self.voxel_map.lock().unwrap())
    }

    /// Whether the working map cloud holds no points.
    pub fn is_empty(&self) -> bool {
        self.map_state.lock().unwrap().map_cloud.is_empty()
    }

    /// Integrates a new scan into the working map.
    ///
    /// `raw_scan` is in sensor frame and feeds space carving; `pre_processed_scan`
    /// (already downsampled/motion-compensated by the caller) is the cloud
    /// actually appended to the map, also in sensor frame.
    #[cfg_attr(feature = "tracing", tracing::instrument("Insert Scan", skip_all))]
    pub fn insert_scan(
        &self,
        raw_scan: &PointCloud,
        pre_processed_scan: &PointCloud,
        map_to_range_sensor: &Isometry3<f64>,
        time: u64,
        perform_carving: bool,
    ) -> bool {
        numeric::assert_rigid(map_to_range_sensor);
        if pre_processed_scan.is_empty() {
            return true;
        }

        let requires_normals = self
            .params
            .lock()
            .unwrap()
            .scan_matcher
            .icp_objective
            .requires_normals();
        let k_nn = self.params.lock().unwrap().scan_matcher.k_nn_normal_estimation;
        let carving_params = self.params.lock().unwrap().map_builder.carving;
        let map_voxel_size = self.params.lock().unwrap().map_builder.map_voxel_size;

        let mut transformed = pre_processed_scan.transformed(map_to_range_sensor);
        if requires_normals && transformed.normals().is_none() {
            transformed.estimate_normals(k_nn.max(3));
        }

        let mut state = self.map_state.lock().unwrap();
        if state.map_cloud.is_empty() {
            state.creation_time = Some(time);
        }
        state.map_to_range_sensor = *map_to_range_sensor;

        if perform_carving {
            let cropper_snapshot = state.cropper.clone();
            let started = Instant::now();
            let outcome = carve_point_cloud(
                raw_scan,
                map_to_range_sensor,
                &cropper_snapshot,
                &carving_params,
                &state.map_cloud,
                &mut state.carve_timer,
                time,
            );
            if outcome.ran {
                self.carve_telemetry.lock().unwrap().record(started.elapsed());
                let to_remove: HashSet<usize> = outcome.removed.into_iter().collect();
                state.map_cloud.remove_indices(&to_remove);
            }
        }

        state.map_cloud.append(&transformed);
        state.cropper.set_pose(*map_to_range_sensor);

        if map_voxel_size > 0.0 {
            let indices: HashSet<usize> = state.cropper.indices_within(&state.map_cloud).into_iter().collect();
            let all_indices: Vec<usize> = (0..state.map_cloud.len()).collect();
            let outside: Vec<usize> = all_indices.iter().copied().filter(|i| !indices.contains(i)).collect();
            let inside: Vec<usize> = all_indices.into_iter().filter(|i| indices.contains(i)).collect();

            let outside_cloud = state.map_cloud.select_by_index(&outside);
            let inside_cloud = state.map_cloud.select_by_index(&inside);
            let mut rebuilt = outside_cloud;
            rebuilt.append(&inside_cloud.voxel_downsample(map_voxel_size));
            state.map_cloud = rebuilt;
        }

        true
    }

    /// Integrates a new raw scan into the dense voxel map.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument("Insert Scan Into Dense Map", skip_all)
    )]
    pub fn insert_scan_dense_map(
        &self,
        raw_scan: &PointCloud,
        map_to_range_sensor: &Isometry3<f64>,
        time: u64,
        perform_carving: bool,
    ) -> bool {
        numeric::assert_rigid(map_to_range_sensor);

        let carving_params = self.params.lock().unwrap().dense_map_builder.carving;

        let mut state = self.dense_state.lock().unwrap();
        state.cropper.set_pose(Isometry3::identity());

        let indices = state.cropper.indices_within(raw_scan);
        let cropped = raw_scan.select_by_index(&indices);
        let color_valid = color_valid_indices(&cropped);
        let filtered = if color_valid.len() == cropped.len() {
            cropped
        } else {
            cropped.select_by_index(&color_valid)
        };

        let transformed = filtered.transformed(map_to_range_sensor);
        state.dense_map.insert(&transformed);

        if perform_carving {
            let mut cropper_snapshot = state.cropper.clone();
            cropper_snapshot.set_pose(*map_to_range_sensor);
            let started = Instant::now();
            let outcome = carve_voxel_cloud(
                raw_scan,
                map_to_range_sensor,
                &cropper_snapshot,
                &carving_params,
                &state.dense_map,
                &mut state.carve_timer,
                time,
            );
            if outcome.ran {
                self.carve_telemetry.lock().unwrap().record(started.elapsed());
                for key in outcome.removed {
                    state.dense_map.remove_key(&key);
                }
            }
        }

        true
    }

    /// Applies a rigid transform to every world-frame representation this
    /// submap owns: `mapCloud`, `sparseMapCloud`, `denseMap`, and
    /// `submapCenter`; composes `mapToRangeSensor`. Atomic with respect to
    /// readers that take both locks (§5); the lock acquisition order is
    /// `map_state` before `dense_state`, matching every other multi-lock
    /// operation on this type.
    #[cfg_attr(feature = "tracing", tracing::instrument("Transform Submap", skip_all))]
    pub fn transform(&self, t: &Isometry3<f64>) {
        numeric::assert_rigid(t);

        let mut map_state = self.map_state.lock().unwrap();
        let mut dense_state = self.dense_state.lock().unwrap();

        map_state.map_cloud.transform(t);
        map_state.sparse_map_cloud.transform(t);
        if map_state.submap_center_computed {
            map_state.submap_center = t.transform_point(&map_state.submap_center);
        }
        map_state.map_to_range_sensor = map_state.map_to_range_sensor * t;

        dense_state.dense_map.transform(t);
    }

    /// Replaces the submap's configuration, rebuilding both cropping
    /// volumes and discarding `denseMap`/`voxelMap` contents.
    #[cfg_attr(feature = "tracing", tracing::instrument("Set Submap Parameters", skip_all))]
    pub fn set_parameters(&self, new_params: MapperParameters) {
        {
            let mut map_state = self.map_state.lock().unwrap();
            map_state.cropper = new_params.map_builder.cropper.build_volume();
        }
        {
            let mut dense_state = self.dense_state.lock().unwrap();
            dense_state.cropper = new_params.dense_map_builder.cropper.build_volume();
            dense_state.dense_map = VoxelizedCloud::new(new_params.dense_map_builder.map_voxel_size);
        }
        {
            let mut voxel_map = self.voxel_map.lock().unwrap();
            *voxel_map = VoxelMap::new(new_params.map_builder.map_voxel_size * VOXEL_INDEX_EXPANSION_FACTOR);
        }
        *self.params.lock().unwrap() = new_params;
    }

    /// Gated by `minSecondsBetweenFeatureComputation`. Rebuilds the sparse
    /// voxel index (C4) in parallel with the feature extractor (C6) over a
    /// snapshot of `mapCloud`, joins both before returning, then installs
    /// the resulting sparse cloud and descriptors.
    #[cfg_attr(feature = "tracing", tracing::instrument("Compute Features", skip_all))]
    pub fn compute_features(&self) {
        let min_interval = Duration::from_secs_f64(
            self.params
                .lock()
                .unwrap()
                .submaps
                .min_seconds_between_feature_computation
                .max(0.0),
        );

        {
            let mut last = self.last_feature_compute.lock().unwrap();
            let due = match *last {
                None => true,
                Some(previous) => previous.elapsed() >= min_interval,
            };
            if !due {
                return;
            }
            *last = Some(Instant::now());
        }

        let snapshot = self.map_state.lock().unwrap().map_cloud.clone();
        if snapshot.is_empty() {
            return;
        }
        let place_recognition_params = self.params.lock().unwrap().place_recognition;

        let (new_voxel_map, feature_set) = std::thread::scope(|scope| {
            let index_handle = scope.spawn(|| {
                let mut map = VoxelMap::new(
                    self.params.lock().unwrap().map_builder.map_voxel_size
                        * VOXEL_INDEX_EXPANSION_FACTOR,
                );
                map.insert_cloud(VOXEL_INDEX_MAP_LAYER, &snapshot);
                map
            });
            let feature_set = feature_extractor::compute(&snapshot, &place_recognition_params);
            let new_voxel_map = index_handle.join().expect("voxel index rebuild thread panicked");
            (new_voxel_map, feature_set)
        });

        let mut map_state = self.map_state.lock().unwrap();
        map_state.sparse_map_cloud = feature_set.sparse_cloud.clone();
        drop(map_state);

        *self.voxel_map.lock().unwrap() = new_voxel_map;
        *self.features.lock().unwrap() = Some(feature_set);
    }

    /// Sets `submapCenter` to the centroid of `mapCloud` and marks it
    /// computed.
    pub fn compute_submap_center(&self) {
        let mut state = self.map_state.lock().unwrap();
        state.submap_center = numeric::centroid(state.map_cloud.points());
        state.submap_center_computed = true;
    }
}

/// Selects the indices of `cloud` whose color is not the "invalid"
/// sentinel (pure black), or all indices if the cloud carries no color.
fn color_valid_indices(cloud: &PointCloud) -> Vec<usize> {
    match cloud.colors() {
        None => (0..cloud.len()).collect(),
        Some(colors) => colors
            .iter()
            .enumerate()
            .filter_map(|(index, color)| (*color != [0, 0, 0]).then_some(index))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{BuilderParameters, CropperParameters};
    use crate::space_carving::CarvingParameters;
    use submap_geometry::VoxelKey;

    fn test_params() -> MapperParameters {
        let builder = BuilderParameters {
            map_voxel_size: 0.5,
            cropper: CropperParameters {
                kind: crate::cropping::CropperKind::MaxRadius,
                radius: 1000.0,
                min_z: -1000.0,
                max_z: 1000.0,
            },
            carving: CarvingParameters {
                max_range_to_drop: 30.0,
                voxel_size_ray: 0.2,
                step_size: 0.05,
                min_dot_threshold_for_dropping: 0.2,
                carve_space_every_nsec: 1_000_000_000,
            },
        };
        MapperParameters {
            map_builder: builder,
            dense_map_builder: builder,
            scan_matcher: Default::default(),
            place_recognition: Default::default(),
            submaps: crate::parameters::SubmapsParameters {
                min_seconds_between_feature_computation: 0.0,
            },
        }
    }

    fn x_axis_points(n: i32) -> PointCloud {
        PointCloud::from_points((0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect())
    }

    #[test]
    fn test_empty_scan_is_a_noop_success() {
        let submap = Submap::new(0, 0, test_params());
        let ok = submap.insert_scan(
            &PointCloud::new(),
            &PointCloud::new(),
            &Isometry3::identity(),
            100,
            false,
        );
        assert!(ok);
        assert!(submap.is_empty());
        assert_eq!(submap.get_map_to_submap_origin(), Isometry3::identity());
    }

    #[test]
    fn test_first_non_empty_insert_sets_creation_time() {
        let submap = Submap::new(0, 0, test_params());
        let scan = x_axis_points(10);
        submap.insert_scan(&scan, &scan, &Isometry3::identity(), 200, false);
        assert!(!submap.is_empty());
        assert!(submap.get_map_point_cloud_copy().len() <= 10);
        let state = submap.map_state.lock().unwrap();
        assert_eq!(state.creation_time, Some(200));
    }

    #[test]
    fn test_insert_scan_never_grows_beyond_input_size() {
        let submap = Submap::new(0, 0, test_params());
        let scan_a = x_axis_points(5);
        let scan_b = PointCloud::from_points(vec![Point3::new(100.0, 0.0, 0.0)]);
        submap.insert_scan(&scan_a, &scan_a, &Isometry3::identity(), 1, false);
        submap.insert_scan(&scan_b, &scan_b, &Isometry3::identity(), 2, false);
        assert!(submap.get_map_point_cloud_copy().len() <= 6);
    }

    #[test]
    fn test_concurrent_read_during_insert_scan_never_sees_torn_state() {
        let submap = Submap::new(0, 0, test_params());
        let total_scans = 50usize;

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..total_scans {
                    let scan = x_axis_points(5);
                    submap.insert_scan(&scan, &scan, &Isometry3::identity(), i as u64 + 1, false);
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    let copy = submap.get_map_point_cloud_copy();
                    if let Some(normals) = copy.normals() {
                        assert_eq!(normals.len(), copy.points().len());
                    }
                    assert!(copy.len() <= 5 * total_scans);
                }
            });
        });

        assert!(!submap.is_empty());
    }

    #[test]
    fn test_transform_then_inverse_restores_state() {
        let submap = Submap::new(0, 0, test_params());
        let scan = x_axis_points(4);
        submap.insert_scan(&scan, &scan, &Isometry3::identity(), 1, false);
        submap.compute_submap_center();

        let before = submap.get_map_point_cloud_copy();
        let before_sensor = submap.map_state.lock().unwrap().map_to_range_sensor;

        let t = Isometry3::translation(1.0, 2.0, 3.0);
        submap.transform(&t);
        submap.transform(&t.inverse());

        let after = submap.get_map_point_cloud_copy();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.points().iter().zip(after.points().iter()) {
            assert!((b - a).norm() < 1e-9);
        }
        let after_sensor = submap.map_state.lock().unwrap().map_to_range_sensor;
        assert!((before_sensor.translation.vector - after_sensor.translation.vector).norm() < 1e-9);
    }

    #[test]
    fn test_transform_shifts_submap_center_consistently() {
        let submap = Submap::new(0, 0, test_params());
        let scan = x_axis_points(4);
        submap.insert_scan(&scan, &scan, &Isometry3::identity(), 1, false);
        submap.compute_submap_center();

        let pre_center = submap.get_map_to_submap_center();
        let t = Isometry3::translation(1.0, 0.0, 0.0);
        submap.transform(&t);
        let post_center = submap.get_map_to_submap_center();
        assert!((post_center - t.transform_point(&pre_center)).norm() < 1e-9);
    }

    #[test]
    fn test_carving_removes_occluded_point_when_enabled() {
        let submap = Submap::new(0, 0, test_params());
        // Seed the map with a stale point directly, bypassing insert_scan's
        // own voxelization so the scenario is exact.
        {
            let mut state = submap.map_state.lock().unwrap();
            state.map_cloud = PointCloud::from_points(vec![Point3::new(5.0, 0.0, 0.0)]);
        }
        let scan = PointCloud::from_points(vec![Point3::new(3.0, 0.0, 0.0)]);
        submap.insert_scan(
            &scan,
            &PointCloud::new(),
            &Isometry3::identity(),
            1,
            true,
        );
        // insert_scan with an empty pre-processed cloud is a no-op even
        // with carving requested, matching P2; exercise carving directly.
        let carving_params = submap.params.lock().unwrap().map_builder.carving;
        let mut state = submap.map_state.lock().unwrap();
        let cropper = state.cropper.clone();
        let outcome = carve_point_cloud(
            &scan,
            &Isometry3::identity(),
            &cropper,
            &carving_params,
            &state.map_cloud,
            &mut state.carve_timer,
            2_000_000_000,
        );
        assert_eq!(outcome.removed, vec![0]);
    }

    #[test]
    fn test_set_parameters_resets_dense_map() {
        let submap = Submap::new(0, 0, test_params());
        submap.insert_scan_dense_map(
            &x_axis_points(5),
            &Isometry3::identity(),
            1,
            false,
        );
        assert!(!submap.get_dense_map().is_empty());

        let mut new_params = test_params();
        new_params.dense_map_builder.map_voxel_size = 2.0;
        submap.set_parameters(new_params);
        assert!(submap.get_dense_map().is_empty());
    }

    #[test]
    fn test_get_features_before_compute_panics() {
        let submap = Submap::new(0, 0, test_params());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| submap.get_features()));
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_features_produces_sparse_cloud_within_budget() {
        let submap = Submap::new(0, 0, test_params());
        let scan = x_axis_points(20);
        submap.insert_scan(&scan, &scan, &Isometry3::identity(), 1, false);
        submap.compute_features();

        let sparse_len = submap.get_sparse_map_point_cloud().len();
        let map_len = submap.get_map_point_cloud_copy().len();
        assert!(sparse_len <= map_len);
    }

    #[test]
    fn test_compute_features_is_gated_within_interval() {
        let mut params = test_params();
        params.submaps.min_seconds_between_feature_computation = 60.0;
        let submap = Submap::new(0, 0, params);
        let scan = x_axis_points(10);
        submap.insert_scan(&scan, &scan, &Isometry3::identity(), 1, false);

        submap.compute_features();
        let first = submap.get_features().descriptors;
        submap.compute_features();
        let second = submap.get_features().descriptors;
        assert_eq!(first, second);
    }

    #[test]
    fn test_voxel_key_roundtrip_used_by_dense_map_is_consistent() {
        let key = VoxelKey::from_point(&Point3::new(1.0, 1.0, 1.0), 0.5);
        assert_eq!(key, VoxelKey::new(2, 2, 2));
    }
}
