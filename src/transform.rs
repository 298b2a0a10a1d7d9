//! Coordinate frame transform service.
//!
//! The coordinator only ever asks one question: express this pose in that
//! frame. The answer can fail three ways, and the control loop treats all
//! of them as recoverable (retries happen naturally as it ticks).

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use crate::types::{PoseStamped, Quaternion};
use crate::utils::normalize_angle;

/// Transform lookup failure modes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("no transform available from {from} to {to}")]
    Lookup { from: String, to: String },

    #[error("frames {from} and {to} are not connected")]
    Connectivity { from: String, to: String },

    #[error("transform from {from} to {to} would require extrapolation")]
    Extrapolation { from: String, to: String },
}

/// Frame transform provider.
pub trait TransformService: Send + Sync {
    /// Express `pose` in `target_frame` using the latest available
    /// transform.
    fn transform(
        &self,
        pose: &PoseStamped,
        target_frame: &str,
    ) -> Result<PoseStamped, TransformError>;
}

/// A planar rigid transform: rotate by yaw, then translate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform2D {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

impl Transform2D {
    pub fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self { x, y, yaw }
    }

    fn apply(&self, pose: &PoseStamped, target_frame: &str) -> PoseStamped {
        let (sin, cos) = self.yaw.sin_cos();
        let px = pose.position.x;
        let py = pose.position.y;

        let mut out = pose.clone();
        out.frame_id = target_frame.to_string();
        out.position.x = self.x + cos * px - sin * py;
        out.position.y = self.y + sin * px + cos * py;
        out.orientation = Quaternion::from_yaw(normalize_angle(pose.yaw() + self.yaw));
        out
    }
}

/// Transform table fed externally (odometry, localization, or a test).
///
/// Only directly registered frame pairs resolve; there is no chaining.
pub struct StaticTransforms {
    table: RwLock<HashMap<(String, String), Transform2D>>,
}

impl StaticTransforms {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or update) the transform taking poses in `from` into
    /// `to`. The inverse direction is registered as well.
    pub fn set(&self, from: &str, to: &str, t: Transform2D) {
        let (sin, cos) = t.yaw.sin_cos();
        let inverse = Transform2D {
            x: -(cos * t.x + sin * t.y),
            y: -(-sin * t.x + cos * t.y),
            yaw: normalize_angle(-t.yaw),
        };

        let mut table = self.table.write();
        table.insert((from.to_string(), to.to_string()), t);
        table.insert((to.to_string(), from.to_string()), inverse);
    }
}

impl Default for StaticTransforms {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformService for StaticTransforms {
    fn transform(
        &self,
        pose: &PoseStamped,
        target_frame: &str,
    ) -> Result<PoseStamped, TransformError> {
        if pose.frame_id == target_frame {
            return Ok(pose.clone());
        }

        let key = (pose.frame_id.clone(), target_frame.to_string());
        match self.table.read().get(&key) {
            Some(t) => Ok(t.apply(pose, target_frame)),
            None => Err(TransformError::Lookup {
                from: pose.frame_id.clone(),
                to: target_frame.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_when_frames_match() {
        let tf = StaticTransforms::new();
        let pose = PoseStamped::new("map", 1.0, 2.0, 0.3);
        let out = tf.transform(&pose, "map").unwrap();
        assert_eq!(out, pose);
    }

    #[test]
    fn test_missing_transform_is_lookup_error() {
        let tf = StaticTransforms::new();
        let pose = PoseStamped::new("odom", 0.0, 0.0, 0.0);
        assert!(matches!(
            tf.transform(&pose, "map"),
            Err(TransformError::Lookup { .. })
        ));
    }

    #[test]
    fn test_translation_and_rotation() {
        let tf = StaticTransforms::new();
        tf.set(
            "base_link",
            "map",
            Transform2D::new(1.0, 2.0, std::f32::consts::FRAC_PI_2),
        );

        let origin = PoseStamped::new("base_link", 0.0, 0.0, 0.0);
        let out = tf.transform(&origin, "map").unwrap();
        assert_relative_eq!(out.position.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(out.position.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(out.yaw(), std::f32::consts::FRAC_PI_2, epsilon = 1e-5);

        let ahead = PoseStamped::new("base_link", 1.0, 0.0, 0.0);
        let out = tf.transform(&ahead, "map").unwrap();
        // One meter ahead of a robot facing +y in the map.
        assert_relative_eq!(out.position.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(out.position.y, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_inverse_round_trip() {
        let tf = StaticTransforms::new();
        tf.set("base_link", "map", Transform2D::new(0.7, -0.4, 0.9));

        let pose = PoseStamped::new("base_link", 0.3, 0.8, -0.2);
        let there = tf.transform(&pose, "map").unwrap();
        let back = tf.transform(&there, "base_link").unwrap();
        assert_relative_eq!(back.position.x, pose.position.x, epsilon = 1e-5);
        assert_relative_eq!(back.position.y, pose.position.y, epsilon = 1e-5);
        assert_relative_eq!(back.yaw(), pose.yaw(), epsilon = 1e-5);
    }
}
