//! Geometric helpers on top of `nalgebra` vectors.
//!
//! Everything here works on plain 3D points;
//! mesh-aware versions live on [`TriangleMesh`][crate::TriangleMesh].

use std::f64::consts::TAU;

use nalgebra as na;

use crate::{UnitVec3, Vec3};

/// Cross product of two edges of a triangle,
/// `(p2 - p0) × (p1 - p0)`.
///
/// The length of the result is twice the triangle's area,
/// and its direction is the (unnormalized) triangle normal.
#[inline]
pub fn triangle_cross(points: &[Vec3; 3]) -> Vec3 {
    (points[2] - points[0]).cross(&(points[1] - points[0]))
}

/// Unsigned area of a triangle.
#[inline]
pub fn triangle_area(points: &[Vec3; 3]) -> f64 {
    triangle_cross(points).norm() / 2.0
}

/// Unit normal of a triangle,
/// or `None` if the triangle is too thin for the normal to be well defined
/// (the cross product is not longer than `epsilon`).
#[inline]
pub fn triangle_normal(points: &[Vec3; 3], epsilon: f64) -> Option<UnitVec3> {
    na::Unit::try_new(triangle_cross(points), epsilon)
}

/// Normalize a vector, failing if it's not longer than `epsilon`.
///
/// On failure the length of the vector is returned for error reporting.
#[inline]
pub fn normalize(v: Vec3, epsilon: f64) -> Result<UnitVec3, f64> {
    na::Unit::try_new(v, epsilon).ok_or_else(|| v.norm())
}

/// Unsigned angle in `[0, π]` between two unit vectors.
///
/// Computed with `atan2` of the sine and cosine
/// instead of `acos` of the dot product,
/// which loses precision close to parallel vectors.
#[inline]
pub fn angle_between(a: &UnitVec3, b: &UnitVec3) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Angle of `v` in the 2D frame spanned by `e_x` and `e_y`,
/// mapped to `[0, 2π)`.
#[inline]
pub fn angle_in_frame(v: &Vec3, e_x: &Vec3, e_y: &Vec3) -> f64 {
    let angle = v.dot(e_y).atan2(v.dot(e_x));
    if angle < 0.0 {
        angle + TAU
    } else {
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{abs_diff_eq, relative_eq};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn unit(x: f64, y: f64, z: f64) -> UnitVec3 {
        na::Unit::new_normalize(Vec3::new(x, y, z))
    }

    #[test]
    fn triangle_area_and_normal() {
        let tri = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!(relative_eq!(triangle_area(&tri), 1.0));
        // (p2 - p0) × (p1 - p0) points down for a counterclockwise triangle
        let n = triangle_normal(&tri, 1e-14).unwrap();
        assert!(abs_diff_eq!(n.into_inner(), Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn degenerate_triangle_has_no_normal() {
        let collinear = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(2.0, 2.0, 2.0),
        ];
        assert!(triangle_normal(&collinear, 1e-14).is_none());
        assert_eq!(triangle_area(&collinear), 0.0);
    }

    #[test]
    fn normalize_reports_length_on_failure() {
        let err = normalize(Vec3::new(1e-20, 0.0, 0.0), 1e-14);
        assert!(matches!(err, Err(len) if relative_eq!(len, 1e-20)));
        let n = normalize(Vec3::new(0.0, 3.0, 4.0), 1e-14).unwrap();
        assert!(relative_eq!(n.norm(), 1.0));
    }

    #[test]
    fn unsigned_angles() {
        let x = unit(1.0, 0.0, 0.0);
        assert!(relative_eq!(angle_between(&x, &unit(0.0, 1.0, 0.0)), FRAC_PI_2));
        assert!(relative_eq!(angle_between(&x, &unit(1.0, 1.0, 0.0)), FRAC_PI_4));
        assert!(relative_eq!(angle_between(&x, &unit(-1.0, 0.0, 0.0)), PI));
        assert_eq!(angle_between(&x, &x), 0.0);
    }

    #[test]
    fn frame_angles_are_positive() {
        let e_x = Vec3::x();
        let e_y = Vec3::y();
        let cases = [
            (Vec3::new(1.0, 0.0, 0.0), 0.0),
            (Vec3::new(0.0, 1.0, 0.0), FRAC_PI_2),
            (Vec3::new(-1.0, 0.0, 0.0), PI),
            (Vec3::new(0.0, -1.0, 0.0), 3.0 * FRAC_PI_2),
            (Vec3::new(1.0, -1.0, 0.0), 7.0 * FRAC_PI_4),
        ];
        for (v, expected) in cases {
            let actual = angle_in_frame(&v, &e_x, &e_y);
            assert!(
                relative_eq!(actual, expected),
                "angle of {v} should be {expected}, got {actual}"
            );
        }
    }
}
