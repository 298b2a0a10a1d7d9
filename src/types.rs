//! Core geometric and message types.
//!
//! Poses are timestamped and carry the reference frame they are expressed
//! in; plans are ordered pose sequences in the planning frame. All scalar
//! math is f32.

use crate::utils::normalize_angle;

/// A 3-D point (meters).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion (x, y, z, w).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation about the vertical axis.
    pub fn from_yaw(yaw: f32) -> Self {
        let half = yaw * 0.5;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    pub fn norm_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn normalized(&self) -> Self {
        let n = self.norm_squared().sqrt();
        Self {
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
            w: self.w / n,
        }
    }

    /// Rotate a vector by this quaternion (assumed unit length).
    pub fn rotate(&self, v: (f32, f32, f32)) -> (f32, f32, f32) {
        // v' = v + 2q_v x (q_v x v + w v)
        let (qx, qy, qz, qw) = (self.x, self.y, self.z, self.w);
        let (vx, vy, vz) = v;

        let tx = qy * vz - qz * vy + qw * vx;
        let ty = qz * vx - qx * vz + qw * vy;
        let tz = qx * vy - qy * vx + qw * vz;

        (
            vx + 2.0 * (qy * tz - qz * ty),
            vy + 2.0 * (qz * tx - qx * tz),
            vz + 2.0 * (qx * ty - qy * tx),
        )
    }

    /// Heading about the vertical axis.
    pub fn yaw(&self) -> f32 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }

    /// Check that this quaternion is usable as a navigation goal
    /// orientation: finite, non-degenerate, and rotating about an axis
    /// close to the world vertical.
    pub fn is_navigation_safe(&self) -> bool {
        if !self.x.is_finite() || !self.y.is_finite() || !self.z.is_finite() || !self.w.is_finite()
        {
            tracing::error!("Quaternion has nans or infs, discarding as a navigation goal");
            return false;
        }

        if self.norm_squared() < 1e-6 {
            tracing::error!("Quaternion has length close to zero, discarding as navigation goal");
            return false;
        }

        // The rotated vertical must stay vertical.
        let q = self.normalized();
        let up = (0.0, 0.0, 1.0);
        let rotated = q.rotate(up);
        let dot = up.0 * rotated.0 + up.1 * rotated.1 + up.2 * rotated.2;

        if (dot - 1.0).abs() > 1e-3 {
            tracing::error!(
                "Quaternion is invalid, the rotation axis must be close to vertical for navigation"
            );
            return false;
        }

        true
    }
}

/// A timestamped pose in a named reference frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseStamped {
    pub frame_id: String,
    /// Seconds; 0.0 means "latest available".
    pub stamp: f64,
    pub position: Point,
    pub orientation: Quaternion,
}

impl PoseStamped {
    pub fn new(frame_id: &str, x: f32, y: f32, yaw: f32) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            stamp: 0.0,
            position: Point::new(x, y, 0.0),
            orientation: Quaternion::from_yaw(yaw),
        }
    }

    /// Euclidean distance in the ground plane.
    pub fn distance_xy(&self, other: &PoseStamped) -> f32 {
        (self.position.x - other.position.x).hypot(self.position.y - other.position.y)
    }

    pub fn yaw(&self) -> f32 {
        self.orientation.yaw()
    }

    /// Heading from this pose toward another, in this frame.
    pub fn bearing_to(&self, other: &PoseStamped) -> f32 {
        normalize_angle(
            (other.position.y - self.position.y).atan2(other.position.x - self.position.x),
        )
    }
}

/// A global path: ordered poses from start to goal, all in the planning
/// frame. An empty plan means planning failed.
pub type Plan = Vec<PoseStamped>;

/// A velocity command: planar linear motion plus rotation about vertical.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Twist {
    pub linear_x: f32,
    pub linear_y: f32,
    pub angular_z: f32,
}

impl Twist {
    pub const ZERO: Twist = Twist {
        linear_x: 0.0,
        linear_y: 0.0,
        angular_z: 0.0,
    };

    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.linear_y == 0.0 && self.angular_z == 0.0
    }
}

/// Progress report published while a recovery behavior executes.
#[derive(Clone, Debug)]
pub struct RecoveryStatus {
    pub pose: PoseStamped,
    pub current_index: usize,
    pub total: usize,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_yaw_round_trip() {
        for &yaw in &[0.0f32, 0.5, -1.2, 3.0, -3.0] {
            let q = Quaternion::from_yaw(yaw);
            assert_relative_eq!(q.yaw(), yaw, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_rotate_vertical_is_invariant_under_yaw() {
        let q = Quaternion::from_yaw(1.0);
        let (x, y, z) = q.rotate((0.0, 0.0, 1.0));
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quaternion_validation_accepts_yaw_rotations() {
        assert!(Quaternion::from_yaw(0.7).is_navigation_safe());
        assert!(Quaternion::IDENTITY.is_navigation_safe());
    }

    #[test]
    fn test_quaternion_validation_rejects_degenerate() {
        let zero = Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
        };
        assert!(!zero.is_navigation_safe());

        let nan = Quaternion {
            x: f32::NAN,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        };
        assert!(!nan.is_navigation_safe());
    }

    #[test]
    fn test_quaternion_validation_rejects_tilt() {
        // Quarter turn about x tips the robot on its side.
        let half = (std::f32::consts::FRAC_PI_2 * 0.5).sin();
        let tilted = Quaternion {
            x: half,
            y: 0.0,
            z: 0.0,
            w: (std::f32::consts::FRAC_PI_2 * 0.5).cos(),
        };
        assert!(!tilted.is_navigation_safe());
    }

    #[test]
    fn test_distance_and_bearing() {
        let a = PoseStamped::new("map", 0.0, 0.0, 0.0);
        let b = PoseStamped::new("map", 3.0, 4.0, 0.0);
        assert_relative_eq!(a.distance_xy(&b), 5.0);
        assert_relative_eq!(a.bearing_to(&b), (4.0f32).atan2(3.0));
    }
}
