//! Pluggable algorithmic collaborators.
//!
//! The coordinator composes three capability sets: a global planner
//! (`make_plan`), a local planner (`set_plan` / `compute_velocity` /
//! `is_goal_reached`), and recovery behaviors (`run`). Implementations are
//! chosen by name through the registry and can be hot-swapped at runtime.

mod grid_planner;
mod pursuit;
mod recovery;
mod registry;

pub use grid_planner::GridPlanner;
pub use pursuit::{PursuitConfig, PursuitController};
pub use recovery::{ClearCostmapRecovery, RotateRecovery};
pub use registry::PluginRegistry;

use parking_lot::Mutex;
use std::sync::Arc;

use crate::costmap::SharedCostmap;
use crate::topics::NavTopics;
use crate::transform::TransformService;
use crate::types::{Plan, PoseStamped, Twist};

/// Resources handed to plugin factories at construction time.
#[derive(Clone)]
pub struct PluginContext {
    pub planner_costmap: SharedCostmap,
    pub controller_costmap: SharedCostmap,
    pub tf: Arc<dyn TransformService>,
    pub topics: NavTopics,
    pub robot_base_frame: String,
}

/// Computes a global path from a start pose to a goal pose.
///
/// Stateless between calls. Invoked with the planner mutex released, so an
/// implementation may take as long as it needs; it must do its own costmap
/// locking.
pub trait GlobalPlanner: Send {
    /// Returns `None` (or an empty plan) when no path exists.
    fn make_plan(&mut self, start: &PoseStamped, goal: &PoseStamped) -> Option<Plan>;
}

/// Tracks a global plan and produces velocity commands.
///
/// The coordinator passes in the robot pose it read this tick, in the
/// planning frame.
pub trait LocalPlanner: Send {
    /// Accept a new plan. Returning false aborts the goal.
    fn set_plan(&mut self, plan: Arc<Plan>) -> bool;

    /// Next velocity command, or `None` when no valid command exists.
    fn compute_velocity(&mut self, pose: &PoseStamped) -> Option<Twist>;

    fn is_goal_reached(&mut self, pose: &PoseStamped) -> bool;
}

/// A side-effecting routine that tries to unblock a stuck robot. May block
/// for seconds; runs strictly serialized with planning.
pub trait RecoveryBehavior: Send {
    fn run(&mut self);
}

/// Handle to the active global planner. The worker clones the handle out
/// under the configuration lock and carries it through one iteration, so a
/// hot-swap mid-planning cannot pull the instance out from under it.
pub type SharedGlobalPlanner = Arc<Mutex<Box<dyn GlobalPlanner>>>;

/// One rung of the recovery ladder.
pub struct RecoveryEntry {
    pub name: String,
    pub behavior: Box<dyn RecoveryBehavior>,
}

/// The active collaborator set, guarded by the configuration mutex so
/// nothing can be swapped mid-tick.
pub struct Collaborators {
    pub global: SharedGlobalPlanner,
    pub global_name: String,
    pub local: Box<dyn LocalPlanner>,
    pub local_name: String,
    pub recoveries: Vec<RecoveryEntry>,
}
