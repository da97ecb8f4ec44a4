use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Rigid registration `reference = R(rotation) * local + shift`.
///
/// `rotation` is in degrees, counter-clockwise in the mathematical sense of
/// the coordinate axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub shift: Vector2<f64>,
    pub rotation: f64,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            shift: Vector2::zeros(),
            rotation: 0.0,
        }
    }

    #[inline]
    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        rotation_matrix(self.rotation)
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::from(self.rotation_matrix() * p.coords + self.shift)
    }

    #[inline]
    pub fn apply_inverse(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::from(self.rotation_matrix().transpose() * (p.coords - self.shift))
    }
}

/// Counter-clockwise rotation by `degrees`.
pub fn rotation_matrix(degrees: f64) -> Matrix2<f64> {
    let (s, c) = degrees.to_radians().sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// One image of the time series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    /// Acquisition time, in hours.
    pub time: f64,
    /// Physical size of one pixel along x and y.
    #[serde(default = "unit_scale")]
    pub scale: Vector2<f64>,
    #[serde(default)]
    pub registration: RigidTransform,
}

fn unit_scale() -> Vector2<f64> {
    Vector2::new(1.0, 1.0)
}

impl Frame {
    pub fn new(name: impl Into<String>, time: f64) -> Self {
        Self {
            name: name.into(),
            time,
            scale: unit_scale(),
            registration: RigidTransform::identity(),
        }
    }

    pub fn with_scale(mut self, sx: f64, sy: f64) -> Self {
        self.scale = Vector2::new(sx, sy);
        self
    }

    #[inline]
    pub fn pixel_to_local(&self, px: Point2<f64>) -> Point2<f64> {
        Point2::new(px.x * self.scale.x, px.y * self.scale.y)
    }

    #[inline]
    pub fn local_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(p.x / self.scale.x, p.y / self.scale.y)
    }

    #[inline]
    pub fn to_reference(&self, p: Point2<f64>) -> Point2<f64> {
        self.registration.apply(p)
    }

    #[inline]
    pub fn from_reference(&self, p: Point2<f64>) -> Point2<f64> {
        self.registration.apply_inverse(p)
    }

    /// Pixel position in this frame of a point given in the shared reference frame.
    #[inline]
    pub fn reference_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        self.local_to_pixel(self.from_reference(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_round_trips() {
        let frame = Frame {
            name: "t1".into(),
            time: 2.0,
            scale: Vector2::new(0.5, 0.25),
            registration: RigidTransform {
                shift: Vector2::new(3.0, -1.0),
                rotation: 30.0,
            },
        };
        let px = Point2::new(12.0, 40.0);
        let reference = frame.to_reference(frame.pixel_to_local(px));
        let back = frame.reference_to_pixel(reference);
        assert!((back - px).norm() < 1e-9);
    }

    #[test]
    fn quarter_turn_maps_x_to_y() {
        let t = RigidTransform {
            shift: Vector2::zeros(),
            rotation: 90.0,
        };
        let p = t.apply(Point2::new(1.0, 0.0));
        assert!(p.x.abs() < 1e-12 && (p.y - 1.0).abs() < 1e-12);
    }
}
