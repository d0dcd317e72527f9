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

use crate::cropping::{CropperKind, CroppingVolume};
use crate::error::SubmapError;
use crate::space_carving::CarvingParameters;

/// The ICP objective a scan matcher (external collaborator) is configured
/// with; determines whether normals must be estimated on incoming scans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IcpObjective {
    /// Point-to-point ICP; does not consume normals.
    #[default]
    PointToPoint,
    /// Point-to-plane ICP; requires a normal per source point.
    PointToPlane,
}

impl IcpObjective {
    /// Whether this objective requires normals on the scan being matched.
    pub fn requires_normals(self) -> bool {
        matches!(self, Self::PointToPlane)
    }
}

/// Cropping volume configuration, as carried by `MapperParameters`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropperParameters {
    /// The volume's shape discriminator.
    pub kind: CropperKind,
    /// Radius (box half-width, cylinder/sphere/max-radius radius).
    pub radius: f64,
    /// Lower Z clip plane, in the volume's own frame.
    pub min_z: f64,
    /// Upper Z clip plane, in the volume's own frame.
    pub max_z: f64,
}

impl CropperParameters {
    /// Parses a cropper kind from its configuration name.
    pub fn with_name(name: &str, radius: f64, min_z: f64, max_z: f64) -> Result<Self, SubmapError> {
        Ok(Self {
            kind: CropperKind::from_name(name)?,
            radius,
            min_z,
            max_z,
        })
    }

    /// Builds a fresh, identity-posed cropping volume from these parameters.
    pub fn build_volume(&self) -> CroppingVolume {
        CroppingVolume::new(self.kind, self.radius, self.min_z, self.max_z)
    }
}

/// Parameters shared by `mapBuilder`/`denseMapBuilder`: a voxel size, a
/// cropping volume shape, and a carving configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuilderParameters {
    /// Voxel size used to downsample/aggregate this builder's cloud.
    /// Non-positive disables voxelization.
    pub map_voxel_size: f64,
    /// The builder's working cropping volume.
    pub cropper: CropperParameters,
    /// The builder's space-carving configuration.
    pub carving: CarvingParameters,
}

/// Configuration consumed by the external scan matcher collaborator; the
/// submap engine only needs to know whether it must estimate normals.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScanMatcherParameters {
    /// Number of nearest neighbors used for scan normal estimation.
    pub k_nn_normal_estimation: usize,
    /// The matcher's ICP objective.
    pub icp_objective: IcpObjective,
}

/// Parameters for the place-recognition feature extractor (C6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaceRecognitionParameters {
    /// Voxel size used to build the sparse feature cloud.
    pub feature_voxel_size: f64,
    /// Radius used for hybrid normal estimation.
    pub normal_estimation_radius: f64,
    /// `k` used for hybrid normal estimation.
    pub normal_knn: usize,
    /// Radius used for the hybrid FPFH neighborhood search.
    pub feature_radius: f64,
    /// `k` used for the hybrid FPFH neighborhood search.
    pub feature_knn: usize,
}

impl Default for PlaceRecognitionParameters {
    fn default() -> Self {
        Self {
            feature_voxel_size: 0.2,
            normal_estimation_radius: 0.5,
            normal_knn: 20,
            feature_radius: 1.0,
            feature_knn: 50,
        }
    }
}

/// Per-submap parameters not owned by a specific builder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubmapsParameters {
    /// Minimum interval, in seconds, between two `computeFeatures` calls.
    pub min_seconds_between_feature_computation: f64,
}

impl Default for SubmapsParameters {
    fn default() -> Self {
        Self {
            min_seconds_between_feature_computation: 1.0,
        }
    }
}

/// The full configuration tree consumed by a `Submap`: mirrors the
/// recognized `MapperParameters` fields used to build map builders, the
/// dense map builder, the scan matcher, and the place-recognition
/// pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapperParameters {
    /// Parameters for the sparse/working map builder.
    pub map_builder: BuilderParameters,
    /// Parameters for the dense map builder.
    pub dense_map_builder: BuilderParameters,
    /// External scan matcher configuration.
    pub scan_matcher: ScanMatcherParameters,
    /// Place-recognition feature extractor configuration.
    pub place_recognition: PlaceRecognitionParameters,
    /// Per-submap gating parameters.
    pub submaps: SubmapsParameters,
}

impl MapperParameters {
    /// Returns a builder pre-populated with sensible defaults.
    pub fn builder() -> MapperParametersBuilder {
        MapperParametersBuilder {
            internal: Self::default(),
        }
    }
}

impl Default for MapperParameters {
    fn default() -> Self {
        let default_builder = BuilderParameters {
            map_voxel_size: 0.1,
            cropper: CropperParameters {
                kind: CropperKind::Sphere,
                radius: 30.0,
                min_z: -10.0,
                max_z: 10.0,
            },
            carving: CarvingParameters::default(),
        };
        Self {
            map_builder: default_builder,
            dense_map_builder: BuilderParameters {
                map_voxel_size: 0.05,
                ..default_builder
            },
            scan_matcher: ScanMatcherParameters::default(),
            place_recognition: PlaceRecognitionParameters::default(),
            submaps: SubmapsParameters::default(),
        }
    }
}

/// A value-returning builder for [`MapperParameters`], mirroring the
/// builder pattern used elsewhere in this workspace for flat configuration
/// structs (as opposed to the typestate builder used where fields have a
/// required/optional distinction enforced at compile time).
#[derive(Clone, Copy, Debug)]
pub struct MapperParametersBuilder {
    internal: MapperParameters,
}

impl MapperParametersBuilder {
    /// Replaces the map-builder parameters.
    pub fn with_map_builder(&self, map_builder: BuilderParameters) -> Self {
        Self {
            internal: MapperParameters {
                map_builder,
                ..self.internal
            },
        }
    }

    /// Replaces the dense-map-builder parameters.
    pub fn with_dense_map_builder(&self, dense_map_builder: BuilderParameters) -> Self {
        Self {
            internal: MapperParameters {
                dense_map_builder,
                ..self.internal
            },
        }
    }

    /// Replaces the scan-matcher parameters.
    pub fn with_scan_matcher(&self, scan_matcher: ScanMatcherParameters) -> Self {
        Self {
            internal: MapperParameters {
                scan_matcher,
                ..self.internal
            },
        }
    }

    /// Replaces the place-recognition parameters.
    pub fn with_place_recognition(&self, place_recognition: PlaceRecognitionParameters) -> Self {
        Self {
            internal: MapperParameters {
                place_recognition,
                ..self.internal
            },
        }
    }

    /// Replaces the per-submap gating parameters.
    pub fn with_submaps(&self, submaps: SubmapsParameters) -> Self {
        Self {
            internal: MapperParameters {
                submaps,
                ..self.internal
            },
        }
    }

    /// Builds a [`MapperParameters`] from the values accumulated so far;
    /// does not consume the builder, so it can be reused.
    pub fn build(&self) -> MapperParameters {
        self.internal
    }
}
