//! Utility maths functions
//!
//! Angles in the convoy software are compass angles in degrees: 0 points along +Y (north), 90
//! along +X (east), and headings are kept in the range `[0, 360)`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it. Due to floating point
/// round-off the result can equal `rhs.abs()` when `lhs` is a very small negative number.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn wrap_360(angle_deg: f64) -> f64 {
    let wrapped = rem_euclid(angle_deg, 360.0);

    // Round-off can land exactly on 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed difference `a - b` between two angles in degrees, wrapped into `[-180, 180)`.
pub fn ang_diff_180(a_deg: f64, b_deg: f64) -> f64 {
    rem_euclid(a_deg - b_deg + 180.0, 360.0) - 180.0
}

/// Compass bearing in degrees from `(from_x, from_y)` to `(to_x, to_y)`.
///
/// The result is in `[0, 360)`, with 0 along +Y and 90 along +X. Coincident points give 0.
pub fn rel_ang_deg(from_x: f64, from_y: f64, to_x: f64, to_y: f64) -> f64 {
    let dx = to_x - from_x;
    let dy = to_y - from_y;

    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }

    wrap_360(dx.atan2(dy).to_degrees())
}

#[cfg(test)]
mod test {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_wrap_360() {
        assert!(close(wrap_360(370.0), 10.0));
        assert!(close(wrap_360(-10.0), 350.0));
        assert!(close(wrap_360(360.0), 0.0));
        assert!(close(wrap_360(0.0), 0.0));
    }

    #[test]
    fn test_ang_diff_180() {
        assert!(close(ang_diff_180(10.0, 350.0), 20.0));
        assert!(close(ang_diff_180(350.0, 10.0), -20.0));
        assert!(close(ang_diff_180(90.0, 0.0), 90.0));
    }

    #[test]
    fn test_rel_ang_deg() {
        assert!(close(rel_ang_deg(0.0, 0.0, 0.0, 1.0), 0.0));
        assert!(close(rel_ang_deg(0.0, 0.0, 1.0, 0.0), 90.0));
        assert!(close(rel_ang_deg(0.0, 0.0, 0.0, -1.0), 180.0));
        assert!(close(rel_ang_deg(0.0, 0.0, -1.0, 0.0), 270.0));
        assert!(close(rel_ang_deg(1.0, 1.0, 1.0, 1.0), 0.0));
    }
}
