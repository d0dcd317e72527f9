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

use nalgebra::{Isometry3, Matrix3, Point3, Vector3};

/// Calculates the mean (centroid) of a point cloud.
///
/// # Returns
/// `Point3::origin()` if `points` is empty.
#[inline]
#[cfg_attr(
    feature = "tracing",
    tracing::instrument("Calculate Point Cloud Centroid", skip_all, level = "debug")
)]
pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }

    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, point| acc + point.coords);
    Point3::from(sum / points.len() as f64)
}

/// Calculates the outer product of two 3-vectors, i.e. `a * b^T`.
#[inline]
pub(crate) fn outer_product(a: &Vector3<f64>, b: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        a.x * b.x, a.x * b.y, a.x * b.z, //
        a.y * b.x, a.y * b.y, a.y * b.z, //
        a.z * b.x, a.z * b.y, a.z * b.z,
    )
}

/// Computes the sample covariance matrix of a neighborhood of points, about
/// their own centroid.
///
/// # Returns
/// `None` if fewer than 3 points are given (a plane cannot be fit).
pub(crate) fn covariance(points: &[Point3<f64>]) -> Option<Matrix3<f64>> {
    if points.len() < 3 {
        return None;
    }

    let mean = centroid(points);
    let cov = points.iter().fold(Matrix3::zeros(), |acc, point| {
        let centered = point - mean;
        acc + outer_product(&centered, &centered)
    });
    Some(cov / points.len() as f64)
}

/// Asserts that `transform` carries no `NaN`/infinite components, the
/// practical proxy for rigidity this crate uses: a `nalgebra::Isometry3` is
/// orthonormal by construction (its rotation is a `UnitQuaternion`), so the
/// only way for it to stop being a valid rigid transform is for a component
/// to have gone non-finite upstream.
///
/// # Panics
/// Panics if any translation or rotation component is not finite.
pub fn assert_rigid(transform: &Isometry3<f64>) {
    let finite = transform.translation.vector.iter().all(|v| v.is_finite())
        && transform
            .rotation
            .quaternion()
            .coords
            .iter()
            .all(|v| v.is_finite());
    assert!(finite, "transform must be a finite rigid isometry");
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_centroid_empty() {
        assert_eq!(centroid(&[]), Point3::origin());
    }

    #[test]
    fn test_centroid() {
        let points = [
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(2.0, 3.0, 4.0),
            Point3::new(3.0, 4.0, 5.0),
            Point3::new(-2.0, -1.0, 0.0),
            Point3::new(-5.0, -2.0, -3.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        assert_eq!(centroid(&points), Point3::new(0.0, 1.0, 1.5));
    }

    #[test]
    fn test_covariance_needs_three_points() {
        assert!(covariance(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]).is_none());
    }

    #[test]
    fn test_covariance_of_planar_points() {
        let points = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
        ];
        let cov = covariance(&points).unwrap();
        // A point cloud flat in Z has zero variance along Z.
        assert_eq!(cov[(2, 2)], 0.0);
        assert!(cov[(0, 0)] > 0.0);
        assert!(cov[(1, 1)] > 0.0);
    }

    #[test]
    fn test_assert_rigid_accepts_identity() {
        assert_rigid(&Isometry3::identity());
    }

    #[test]
    #[should_panic]
    fn test_assert_rigid_rejects_nan_translation() {
        let bad = Isometry3::from_parts(
            Vector3::new(f64::NAN, 0.0, 0.0).into(),
            UnitQuaternion::identity(),
        );
        assert_rigid(&bad);
    }
}
