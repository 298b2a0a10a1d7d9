//! Built-in recovery behaviors: costmap clearing and in-place rotation.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::costmap::SharedCostmap;
use crate::topics::NavTopics;
use crate::transform::TransformService;
use crate::types::{PoseStamped, Twist};

/// Restores costmap cells beyond a reset distance from the robot to the
/// static layer. Obstacles near the robot are trusted; remote ones are
/// assumed to be stale sensor artifacts blocking the planner.
pub struct ClearCostmapRecovery {
    name: String,
    reset_distance: f32,
    planner_costmap: SharedCostmap,
    controller_costmap: SharedCostmap,
    tf: Arc<dyn TransformService>,
    robot_base_frame: String,
}

impl ClearCostmapRecovery {
    pub fn new(
        name: &str,
        reset_distance: f32,
        planner_costmap: SharedCostmap,
        controller_costmap: SharedCostmap,
        tf: Arc<dyn TransformService>,
        robot_base_frame: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            reset_distance,
            planner_costmap,
            controller_costmap,
            tf,
            robot_base_frame: robot_base_frame.to_string(),
        }
    }

    fn clear_one(&self, costmap: &SharedCostmap) {
        let origin = PoseStamped::new(&self.robot_base_frame, 0.0, 0.0, 0.0);
        let frame = costmap.lock().global_frame().to_string();
        match self.tf.transform(&origin, &frame) {
            Ok(pose) => {
                let mut map = costmap.lock();
                map.clear_beyond(pose.position.x, pose.position.y, self.reset_distance);
            }
            Err(e) => {
                tracing::warn!(
                    "{}: cannot locate the robot, clearing skipped: {}",
                    self.name,
                    e
                );
            }
        }
    }
}

impl super::RecoveryBehavior for ClearCostmapRecovery {
    fn run(&mut self) {
        tracing::info!(
            "{}: clearing costmaps beyond {:.2}m of the robot",
            self.name,
            self.reset_distance
        );
        self.clear_one(&self.planner_costmap);
        self.clear_one(&self.controller_costmap);
    }
}

/// Rotates the robot in place through a full turn so its sensors re-sweep
/// the surroundings. Open loop: commands a constant angular velocity for
/// the duration of one revolution, then stops.
pub struct RotateRecovery {
    topics: NavTopics,
    angular_vel: f32,
    command_period: Duration,
}

impl RotateRecovery {
    pub fn new(topics: NavTopics, angular_vel: f32) -> Self {
        Self {
            topics,
            angular_vel,
            command_period: Duration::from_millis(50),
        }
    }
}

impl super::RecoveryBehavior for RotateRecovery {
    fn run(&mut self) {
        if self.angular_vel <= 0.0 {
            tracing::warn!("Rotate recovery disabled by a non-positive angular velocity");
            return;
        }
        tracing::info!("Rotating in place at {:.2} rad/s", self.angular_vel);

        let total = Duration::from_secs_f32(2.0 * std::f32::consts::PI / self.angular_vel);
        let command = Twist {
            linear_x: 0.0,
            linear_y: 0.0,
            angular_z: self.angular_vel,
        };

        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.topics.cmd_vel.publish(command);
            thread::sleep(self.command_period);
            elapsed += self.command_period;
        }
        self.topics.publish_zero_velocity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costmap::{cost, Costmap};
    use crate::plugins::RecoveryBehavior;
    use crate::transform::{StaticTransforms, Transform2D};

    #[test]
    fn test_clear_keeps_near_obstacles() {
        let planner_map = Costmap::new("global_costmap", "map", 40, 40, 0.1, -2.0, -2.0);
        let controller_map = Costmap::new("local_costmap", "map", 40, 40, 0.1, -2.0, -2.0);
        let planner_map = planner_map.into_shared();
        let controller_map = controller_map.into_shared();

        {
            let mut map = planner_map.lock();
            let (nx, ny) = map.world_to_grid(0.2, 0.0);
            let (fx, fy) = map.world_to_grid(1.8, 1.8);
            map.set_cost(nx, ny, cost::LETHAL);
            map.set_cost(fx, fy, cost::LETHAL);
        }

        let tf = Arc::new(StaticTransforms::new());
        tf.set("base_link", "map", Transform2D::new(0.0, 0.0, 0.0));

        let mut recovery = ClearCostmapRecovery::new(
            "conservative_reset",
            1.0,
            planner_map.clone(),
            controller_map,
            tf,
            "base_link",
        );
        recovery.run();

        let map = planner_map.lock();
        let (nx, ny) = map.world_to_grid(0.2, 0.0);
        let (fx, fy) = map.world_to_grid(1.8, 1.8);
        assert_eq!(map.cost(nx, ny), cost::LETHAL);
        assert_eq!(map.cost(fx, fy), cost::FREE);
    }

    #[test]
    fn test_rotate_publishes_commands_then_stops() {
        let topics = NavTopics::new();
        let rx = topics.cmd_vel.subscribe();

        // Fast enough that one revolution completes in a few periods.
        let mut recovery = RotateRecovery::new(topics, 40.0);
        recovery.run();

        let commands: Vec<Twist> = rx.try_iter().collect();
        assert!(commands.len() >= 2);
        assert!(commands[..commands.len() - 1]
            .iter()
            .all(|t| t.angular_z > 0.0 && t.linear_x == 0.0));
        assert!(commands.last().unwrap().is_zero());
    }
}
