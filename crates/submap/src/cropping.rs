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

use nalgebra::{Isometry3, Point3};
use submap_geometry::PointCloud;

use crate::error::SubmapError;

/// The shape discriminator for a [`CroppingVolume`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropperKind {
    /// An axis-aligned (in the volume's own frame) box: `|x|, |y| <= radius`,
    /// `z ∈ [min_z, max_z]`.
    Box,
    /// A vertical cylinder: `x^2 + y^2 <= radius^2`, `z ∈ [min_z, max_z]`.
    Cylinder,
    /// A sphere additionally clipped to `z ∈ [min_z, max_z]`.
    Sphere,
    /// A bare radial cutoff with no height bound, used to bound carving
    /// candidates around the sensor regardless of scan pitch.
    MaxRadius,
}

impl CropperKind {
    /// Parses a cropper kind from a `MapperParameters` discriminator name.
    pub fn from_name(name: &str) -> Result<Self, SubmapError> {
        match name {
            "box" => Ok(Self::Box),
            "cylinder" => Ok(Self::Cylinder),
            "sphere" => Ok(Self::Sphere),
            "max-radius" | "max_radius" => Ok(Self::MaxRadius),
            other => Err(SubmapError::UnknownCropperKind(other.to_string())),
        }
    }
}

/// A pose-anchored spatial predicate used to bound map updates and carving
/// candidates.
#[derive(Clone, Debug)]
pub struct CroppingVolume {
    kind: CropperKind,
    pose: Isometry3<f64>,
    radius: f64,
    min_z: f64,
    max_z: f64,
}

impl CroppingVolume {
    /// Builds a cropping volume at the identity pose.
    pub fn new(kind: CropperKind, radius: f64, min_z: f64, max_z: f64) -> Self {
        Self {
            kind,
            pose: Isometry3::identity(),
            radius,
            min_z,
            max_z,
        }
    }

    /// The volume's shape discriminator.
    pub fn kind(&self) -> CropperKind {
        self.kind
    }

    /// The volume's current anchor pose.
    pub fn pose(&self) -> &Isometry3<f64> {
        &self.pose
    }

    /// Repositions the volume without changing its shape parameters.
    pub fn set_pose(&mut self, pose: Isometry3<f64>) {
        submap_geometry::numeric::assert_rigid(&pose);
        self.pose = pose;
    }

    /// Whether `point_world` (expressed in the same frame as `self.pose()`)
    /// falls inside the volume. Points exactly on the boundary are included.
    pub fn contains(&self, point_world: &Point3<f64>) -> bool {
        let local = self.pose.inverse_transform_point(point_world);
        match self.kind {
            CropperKind::Box => {
                local.x.abs() <= self.radius
                    && local.y.abs() <= self.radius
                    && local.z >= self.min_z
                    && local.z <= self.max_z
            }
            CropperKind::Cylinder => {
                local.x * local.x + local.y * local.y <= self.radius * self.radius
                    && local.z >= self.min_z
                    && local.z <= self.max_z
            }
            CropperKind::Sphere => {
                local.coords.norm_squared() <= self.radius * self.radius
                    && local.z >= self.min_z
                    && local.z <= self.max_z
            }
            CropperKind::MaxRadius => local.coords.norm_squared() <= self.radius * self.radius,
        }
    }

    /// Returns a new cloud containing only the points inside the volume,
    /// with all attributes preserved.
    #[cfg_attr(feature = "tracing", tracing::instrument("Crop Point Cloud", skip_all))]
    pub fn crop(&self, cloud: &PointCloud) -> PointCloud {
        let indices = self.indices_within(cloud);
        cloud.select_by_index(&indices)
    }

    /// Returns the sorted, unique indices of points in `cloud` that fall
    /// inside the volume.
    pub fn indices_within(&self, cloud: &PointCloud) -> Vec<usize> {
        cloud
            .points()
            .iter()
            .enumerate()
            .filter_map(|(index, point)| self.contains(point).then_some(index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_rejects_unknown_kind() {
        assert!(CropperKind::from_name("donut").is_err());
    }

    #[test]
    fn test_box_boundary_is_included() {
        let volume = CroppingVolume::new(CropperKind::Box, 1.0, -1.0, 1.0);
        assert!(volume.contains(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!volume.contains(&Point3::new(1.01, 0.0, 0.0)));
    }

    #[test]
    fn test_cylinder_ignores_radial_z() {
        let volume = CroppingVolume::new(CropperKind::Cylinder, 2.0, 0.0, 5.0);
        assert!(volume.contains(&Point3::new(1.9, 0.0, 4.9)));
        assert!(!volume.contains(&Point3::new(1.9, 0.0, 5.1)));
    }

    #[test]
    fn test_sphere_vs_max_radius() {
        let sphere = CroppingVolume::new(CropperKind::Sphere, 2.0, -0.5, 0.5);
        let max_radius = CroppingVolume::new(CropperKind::MaxRadius, 2.0, -0.5, 0.5);
        let point = Point3::new(0.0, 0.0, 1.9);
        assert!(!sphere.contains(&point));
        assert!(max_radius.contains(&point));
    }

    #[test]
    fn test_indices_within_respects_pose() {
        let mut volume = CroppingVolume::new(CropperKind::Sphere, 1.0, -10.0, 10.0);
        volume.set_pose(Isometry3::translation(5.0, 0.0, 0.0));
        let cloud = PointCloud::from_points(vec![
            Point3::new(5.2, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ]);
        assert_eq!(volume.indices_within(&cloud), vec![0]);
    }
}
