use std::f32::consts::FRAC_PI_2;

use crate::error::{CaptureError, Result};

/// Points per face in the iBUG 300-W annotation scheme.
pub const FACE_LANDMARK_COUNT: usize = 68;

pub const JAW_RIGHT_END: usize = 0;
pub const JAW_RIGHT_CHEEK: usize = 3;
pub const JAW_LEFT_CHEEK: usize = 13;
pub const JAW_LEFT_END: usize = 16;
pub const NOSE_TIP: usize = 30;
pub const NOSE_BASE: usize = 33;
pub const RIGHT_EYE_OUTER: usize = 36;
pub const LEFT_EYE_OUTER: usize = 45;
pub const MOUTH_RIGHT: usize = 48;
pub const UPPER_LIP_TOP: usize = 51;
pub const MOUTH_LEFT: usize = 54;

/// 68 ordered image-space points for one face.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<(f32, f32)>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<(f32, f32)>) -> Result<Self> {
        if points.len() != FACE_LANDMARK_COUNT {
            return Err(CaptureError::Model(format!(
                "expected {FACE_LANDMARK_COUNT} landmarks, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(CaptureError::Model("non-finite landmark coordinate".into()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn point(&self, index: usize) -> (f32, f32) {
        self.points[index]
    }

    pub fn distance(&self, a: usize, b: usize) -> f32 {
        let (ax, ay) = self.point(a);
        let (bx, by) = self.point(b);
        (bx - ax).hypot(by - ay)
    }

    pub fn midpoint(&self, a: usize, b: usize) -> (f32, f32) {
        let (ax, ay) = self.point(a);
        let (bx, by) = self.point(b);
        ((ax + bx) / 2.0, (ay + by) / 2.0)
    }

    /// `atan` of the slope from `a` to `b`, in radians. Positive when `b`
    /// sits lower in the image; never flips beyond a quarter turn.
    pub fn tilt(&self, a: usize, b: usize) -> f32 {
        let (ax, ay) = self.point(a);
        let (bx, by) = self.point(b);
        let (dx, dy) = (bx - ax, by - ay);
        if dx == 0.0 {
            if dy == 0.0 { 0.0 } else { FRAC_PI_2 * dy.signum() }
        } else {
            (dy / dx).atan()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Landmarks with every point at `fill` except the listed overrides.
    pub(crate) fn landmarks_with(fill: (f32, f32), overrides: &[(usize, (f32, f32))]) -> FaceLandmarks {
        let mut points = vec![fill; FACE_LANDMARK_COUNT];
        for (idx, point) in overrides {
            points[*idx] = *point;
        }
        FaceLandmarks::new(points).unwrap()
    }

    #[test]
    fn rejects_wrong_point_counts() {
        assert!(FaceLandmarks::new(vec![(0.0, 0.0); 67]).is_err());
        assert!(FaceLandmarks::new(vec![(0.0, 0.0); 69]).is_err());
        let mut points = vec![(1.0, 1.0); FACE_LANDMARK_COUNT];
        points[5].0 = f32::NAN;
        assert!(FaceLandmarks::new(points).is_err());
    }

    #[test]
    fn geometry_helpers() {
        let lm = landmarks_with(
            (0.0, 0.0),
            &[(RIGHT_EYE_OUTER, (10.0, 20.0)), (LEFT_EYE_OUTER, (40.0, 60.0))],
        );
        assert_eq!(lm.distance(RIGHT_EYE_OUTER, LEFT_EYE_OUTER), 50.0);
        assert_eq!(lm.midpoint(RIGHT_EYE_OUTER, LEFT_EYE_OUTER), (25.0, 40.0));
        assert!((lm.tilt(RIGHT_EYE_OUTER, LEFT_EYE_OUTER) - (4.0f32 / 3.0).atan()).abs() < 1e-6);
        // Swapping the anchors keeps the same tilt.
        assert!(
            (lm.tilt(LEFT_EYE_OUTER, RIGHT_EYE_OUTER) - lm.tilt(RIGHT_EYE_OUTER, LEFT_EYE_OUTER))
                .abs()
                < 1e-6
        );
        assert_eq!(lm.tilt(0, 1), 0.0);
    }
}
