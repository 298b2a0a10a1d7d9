//! SarathiNav - Navigation Coordinator
//!
//! A long-running control process that, given a goal pose, continuously
//! produces velocity commands that drive a robot to that pose while
//! avoiding obstacles. The coordinator itself neither plans paths nor
//! computes velocities; it composes three pluggable collaborators (a
//! global planner, a local planner, and a ladder of recovery behaviors)
//! into a single fault-tolerant control loop.
//!
//! ## Concurrent Architecture
//!
//! Two cooperating threads form the core:
//!
//! - **Control loop** (driven per goal, ~20Hz): ingests goals, feeds the
//!   local planner, publishes velocity and feedback, runs the three-state
//!   machine and the recovery ladder
//! - **Planner worker** (background): recomputes the global path on a
//!   cadence, hands results to the control loop through a triple-buffered
//!   plan exchange
//!
//! Oscillation and patience supervisors watch the loop and escalate
//! persistent failures through the recovery ladder until the goal
//! succeeds, aborts, or is preempted.

pub mod action;
pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod costmap;
pub mod error;
pub mod plugins;
pub mod shared;
pub mod supervision;
pub mod threads;
pub mod topics;
pub mod transform;
pub mod types;
pub mod utils;

pub use action::{ActionServer, Feedback, TerminalStatus};
pub use config::SarathiConfig;
pub use coordinator::Coordinator;
pub use costmap::{Costmap, SharedCostmap};
pub use error::{Result, SarathiError};
pub use plugins::{GlobalPlanner, LocalPlanner, PluginRegistry, RecoveryBehavior};
pub use shared::{NavState, RecoveryTrigger};
pub use topics::{NavTopics, Topic};
pub use transform::{StaticTransforms, Transform2D, TransformService};
pub use types::{Plan, Point, PoseStamped, Quaternion, RecoveryStatus, Twist};
