//! Default local planner: waypoint pursuit.
//!
//! Drives toward the next plan waypoint with proportional heading control
//! and angle-dependent speed scaling, finishing with an in-place turn onto
//! the goal heading.

use std::sync::Arc;

use crate::types::{Plan, PoseStamped, Twist};
use crate::utils::normalize_angle;

/// Tuning for the pursuit controller.
#[derive(Clone, Debug)]
pub struct PursuitConfig {
    /// Distance at which an intermediate waypoint counts as passed (meters)
    pub waypoint_tolerance: f32,
    /// Distance tolerance for the final goal position (meters)
    pub goal_tolerance: f32,
    /// Heading tolerance for the final goal orientation (radians)
    pub yaw_tolerance: f32,
    /// Maximum linear velocity (m/s)
    pub max_linear_vel: f32,
    /// Maximum angular velocity (rad/s)
    pub max_angular_vel: f32,
    /// Proportional gain for heading control
    pub kp_angular: f32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            waypoint_tolerance: 0.10,
            goal_tolerance: 0.15,
            yaw_tolerance: 0.17,
            max_linear_vel: 0.2,
            max_angular_vel: 0.5,
            kp_angular: 2.0,
        }
    }
}

pub struct PursuitController {
    config: PursuitConfig,
    plan: Option<Arc<Plan>>,
    current_waypoint: usize,
}

impl PursuitController {
    pub fn new(config: PursuitConfig) -> Self {
        Self {
            config,
            plan: None,
            current_waypoint: 0,
        }
    }

    /// Skip waypoints the robot has already passed.
    fn advance_waypoints(&mut self, pose: &PoseStamped) {
        let Some(plan) = &self.plan else { return };
        while self.current_waypoint + 1 < plan.len() {
            let wp = &plan[self.current_waypoint];
            if pose.distance_xy(wp) > self.config.waypoint_tolerance {
                break;
            }
            self.current_waypoint += 1;
        }
    }

    /// Heading-proportional drive toward a waypoint.
    fn drive_to_point(&self, pose: &PoseStamped, target: &PoseStamped, distance: f32) -> Twist {
        let angle_error = normalize_angle(pose.bearing_to(target) - pose.yaw());
        let angle_error_abs = angle_error.abs();

        let angular = (self.config.kp_angular * angle_error)
            .clamp(-self.config.max_angular_vel, self.config.max_angular_vel);

        // Full speed straight ahead, crawl when pointed away; always some
        // forward motion so the base cannot spin in place forever.
        let angle_factor = if angle_error_abs < 0.17 {
            1.0
        } else if angle_error_abs < std::f32::consts::FRAC_PI_2 {
            1.0 - 0.8 * (angle_error_abs - 0.17) / (std::f32::consts::FRAC_PI_2 - 0.17)
        } else {
            0.1
        };

        let distance_speed = (distance * 0.8).min(self.config.max_linear_vel);

        Twist {
            linear_x: distance_speed * angle_factor,
            linear_y: 0.0,
            angular_z: angular,
        }
    }

    /// Rotate in place onto a target heading.
    fn turn_to_heading(&self, pose: &PoseStamped, target_yaw: f32) -> Twist {
        let error = normalize_angle(target_yaw - pose.yaw());
        Twist {
            linear_x: 0.0,
            linear_y: 0.0,
            angular_z: (self.config.kp_angular * error)
                .clamp(-self.config.max_angular_vel, self.config.max_angular_vel),
        }
    }
}

impl super::LocalPlanner for PursuitController {
    fn set_plan(&mut self, plan: Arc<Plan>) -> bool {
        if plan.is_empty() {
            tracing::warn!("Refusing an empty plan");
            return false;
        }
        tracing::debug!("Tracking a new {}-pose plan", plan.len());
        self.plan = Some(plan);
        self.current_waypoint = 0;
        true
    }

    fn compute_velocity(&mut self, pose: &PoseStamped) -> Option<Twist> {
        self.advance_waypoints(pose);
        let plan = self.plan.as_ref()?;

        let goal = plan.last()?;
        let goal_distance = pose.distance_xy(goal);
        if goal_distance <= self.config.goal_tolerance {
            // Position held; align the heading.
            return Some(self.turn_to_heading(pose, goal.yaw()));
        }

        let target = &plan[self.current_waypoint];
        let distance = pose.distance_xy(target);
        Some(self.drive_to_point(pose, target, distance.max(goal_distance)))
    }

    fn is_goal_reached(&mut self, pose: &PoseStamped) -> bool {
        let Some(plan) = &self.plan else { return false };
        let Some(goal) = plan.last() else { return false };

        pose.distance_xy(goal) <= self.config.goal_tolerance
            && normalize_angle(goal.yaw() - pose.yaw()).abs() <= self.config.yaw_tolerance
    }
}
