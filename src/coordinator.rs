//! The navigation coordinator.
//!
//! Composes the global planner, local planner, and recovery ladder into a
//! fault-tolerant control loop. Each accepted goal drives a three-state
//! machine: `Planning` while the background worker searches for a path,
//! `Controlling` while the local planner emits velocities along it, and
//! `Clearing` while a recovery behavior tries to unblock the robot.
//! Supervisors watch for stalled planning, stalled control, and lack of
//! displacement, and escalate through the recovery ladder until the goal
//! succeeds or the ladder runs out.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::action::{ActionServer, Feedback, TerminalStatus};
use crate::config::{RecoveryBehaviorSpec, SarathiConfig};
use crate::costmap::{cost, SharedCostmap};
use crate::error::{Result, SarathiError};
use crate::plugins::{
    ClearCostmapRecovery, Collaborators, PluginContext, PluginRegistry, RecoveryEntry,
    RotateRecovery,
};
use crate::shared::{NavShared, NavState, RecoveryTrigger};
use crate::supervision::{self, OscillationGuard, RecoveryLadder};
use crate::threads::{self, PlannerContext};
use crate::topics::NavTopics;
use crate::transform::{TransformError, TransformService};
use crate::types::{Plan, PoseStamped, RecoveryStatus};
use crate::utils::Throttle;

const INVALID_QUATERNION_MSG: &str =
    "Aborting on goal because it was sent with an invalid quaternion";

/// Angular speed of the default in-place rotation recovery (rad/s).
const ROTATE_RECOVERY_VEL: f32 = 1.0;

/// Book-keeping local to one goal execution. Only the control loop
/// touches these, so they live outside the shared state.
struct GoalExecution {
    goal: PoseStamped,
    last_valid_control: Instant,
    oscillation: OscillationGuard,
    ladder: RecoveryLadder,
    pose_warn: Throttle,
    stale_warn: Throttle,
}

impl GoalExecution {
    fn new(goal: PoseStamped) -> Self {
        Self {
            goal,
            last_valid_control: Instant::now(),
            oscillation: OscillationGuard::new(),
            ladder: RecoveryLadder::new(),
            pose_warn: Throttle::new(Duration::from_secs(1)),
            stale_warn: Throttle::new(Duration::from_secs(1)),
        }
    }

    /// Re-arm the supervisors for a replacement goal (preemption or a
    /// planning frame change).
    fn accept(&mut self, goal: &PoseStamped) {
        self.goal = goal.clone();
        self.last_valid_control = Instant::now();
        self.oscillation = OscillationGuard::new();
        self.ladder.reset();
    }
}

/// The long-running navigation coordinator.
pub struct Coordinator {
    config: Arc<RwLock<SarathiConfig>>,
    registry: PluginRegistry,
    shared: Arc<NavShared>,
    collaborators: Arc<Mutex<Collaborators>>,
    planner_costmap: SharedCostmap,
    controller_costmap: SharedCostmap,
    tf: Arc<dyn TransformService>,
    topics: NavTopics,
    server: ActionServer,
    plugin_ctx: PluginContext,
    planner_thread: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Coordinator {
    /// Construct the coordinator and start its planner worker.
    ///
    /// Fails only if a configured default collaborator cannot be built;
    /// everything after construction is handled without tearing the
    /// process down.
    pub fn new(
        config: SarathiConfig,
        registry: PluginRegistry,
        planner_costmap: SharedCostmap,
        controller_costmap: SharedCostmap,
        tf: Arc<dyn TransformService>,
    ) -> Result<Self> {
        let topics = NavTopics::new();
        let server = ActionServer::new(topics.action_goal.clone());

        let plugin_ctx = PluginContext {
            planner_costmap: Arc::clone(&planner_costmap),
            controller_costmap: Arc::clone(&controller_costmap),
            tf: Arc::clone(&tf),
            topics: topics.clone(),
            robot_base_frame: config.frames.robot_base_frame.clone(),
        };

        let global = registry.create_global(&config.planner.base_global_planner, &plugin_ctx)?;
        tracing::info!("Created global planner {}", config.planner.base_global_planner);
        let local = registry.create_local(&config.controller.base_local_planner, &plugin_ctx)?;
        tracing::info!("Created local planner {}", config.controller.base_local_planner);

        let recoveries = build_recovery_ladder(&config, &registry, &plugin_ctx);

        let collaborators = Arc::new(Mutex::new(Collaborators {
            global: Arc::new(Mutex::new(global)),
            global_name: config.planner.base_global_planner.clone(),
            local,
            local_name: config.controller.base_local_planner.clone(),
            recoveries,
        }));

        if config.costmap.shutdown_costmaps {
            tracing::debug!("Stopping costmaps initially");
            planner_costmap.lock().stop();
            controller_costmap.lock().stop();
        }

        let shared = Arc::new(NavShared::new());
        let config = Arc::new(RwLock::new(config));

        let planner_thread = threads::spawn_planner(PlannerContext {
            shared: Arc::clone(&shared),
            collaborators: Arc::clone(&collaborators),
            planner_costmap: Arc::clone(&planner_costmap),
            tf: Arc::clone(&tf),
            topics: topics.clone(),
            config: Arc::clone(&config),
        });

        Ok(Self {
            config,
            registry,
            shared,
            collaborators,
            planner_costmap,
            controller_costmap,
            tf,
            topics,
            server,
            plugin_ctx,
            planner_thread: Some(planner_thread),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The goal endpoint: submit, preempt, and cancel through this.
    pub fn action_server(&self) -> &ActionServer {
        &self.server
    }

    /// Output topics: velocity, current goal, recovery status.
    pub fn topics(&self) -> &NavTopics {
        &self.topics
    }

    /// The global planner's costmap handle.
    pub fn planner_costmap(&self) -> &SharedCostmap {
        &self.planner_costmap
    }

    /// The local planner's costmap handle.
    pub fn controller_costmap(&self) -> &SharedCostmap {
        &self.controller_costmap
    }

    /// Current state machine state (diagnostic).
    pub fn state(&self) -> NavState {
        self.shared.state()
    }

    /// Stop the worker and the goal-service loop.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shared.request_shutdown();
    }

    /// Service goals from the action endpoint until shutdown.
    pub fn run(&self) {
        tracing::info!("Coordinator ready for goals");
        while !self.shutdown.load(Ordering::SeqCst) {
            let Some(goal) = self.server.wait_for_goal(Duration::from_millis(100)) else {
                continue;
            };
            tracing::info!(
                "Received a goal of x: {:.2}, y: {:.2}",
                goal.position.x,
                goal.position.y
            );
            let result = self.execute(goal);
            tracing::info!("Goal finished: {:?}", result);
        }
        tracing::info!("Coordinator stopped");
    }

    /// Drive one goal to a terminal status. Preemption by newer goals is
    /// handled transparently inside; only the final goal produces the
    /// returned status.
    pub fn execute(&self, goal: PoseStamped) -> TerminalStatus {
        self.server.set_active(true);
        let result = self.execute_goal(goal);
        self.server.set_active(false);
        self.server.result.publish(result.clone());
        result
    }

    fn execute_goal(&self, goal: PoseStamped) -> TerminalStatus {
        if !goal.orientation.is_navigation_safe() {
            return TerminalStatus::Aborted(INVALID_QUATERNION_MSG.to_string());
        }

        let goal = self.goal_to_global_frame(&goal);
        self.topics.publish_zero_velocity();
        self.shared.start_goal(goal.clone());
        self.topics.current_goal.publish(goal.clone());

        if self.config.read().costmap.shutdown_costmaps {
            tracing::debug!("Starting up costmaps that were shut down previously");
            self.planner_costmap.lock().start();
            self.controller_costmap.lock().start();
        }

        let mut exec = GoalExecution::new(goal);

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.reset_state();
                return TerminalStatus::Aborted(
                    "Aborting on the goal because the coordinator is shutting down".to_string(),
                );
            }

            let tick_start = Instant::now();

            // A newer goal replaces the current one without tearing the
            // loop down; an explicit cancel ends it.
            if self.server.preempt_requested() {
                if let Some(new_goal) = self.server.accept_new_goal() {
                    if !new_goal.orientation.is_navigation_safe() {
                        self.reset_state();
                        return TerminalStatus::Aborted(INVALID_QUATERNION_MSG.to_string());
                    }
                    let new_goal = self.goal_to_global_frame(&new_goal);
                    tracing::debug!(
                        "Preempted by a new goal of x: {:.2}, y: {:.2}",
                        new_goal.position.x,
                        new_goal.position.y
                    );
                    exec.accept(&new_goal);
                    self.topics.publish_zero_velocity();
                    self.shared.start_goal(new_goal.clone());
                    self.topics.current_goal.publish(new_goal);
                } else if self.server.take_cancel() {
                    tracing::debug!("Preempting the current goal on request");
                    self.reset_state();
                    return TerminalStatus::Preempted;
                }
            }

            // If the planning frame changed, the goal has to be
            // re-anchored. Failures retry naturally on later ticks.
            let global_frame = self.planner_costmap.lock().global_frame().to_string();
            if exec.goal.frame_id != global_frame {
                let moved = self.goal_to_global_frame(&exec.goal);
                if moved.frame_id == global_frame {
                    tracing::debug!("Planning frame changed, goal moved into {}", global_frame);
                    exec.accept(&moved);
                    self.topics.publish_zero_velocity();
                    self.shared.start_goal(moved.clone());
                    self.topics.current_goal.publish(moved);
                }
            }

            if let Some(result) = self.execute_cycle(&mut exec) {
                return result;
            }

            // Hold the tick rate; complain only when an overrun happens
            // while actually controlling.
            let frequency = self.config.read().controller.controller_frequency;
            if frequency > 0.0 {
                let period = Duration::from_secs_f32(1.0 / frequency);
                let elapsed = tick_start.elapsed();
                if elapsed < period {
                    thread::sleep(period - elapsed);
                } else if self.shared.state() == NavState::Controlling {
                    tracing::warn!(
                        "Control loop missed its desired rate of {:.2}Hz, the tick took {:.4}s",
                        frequency,
                        elapsed.as_secs_f32()
                    );
                }
            }
        }
    }

    /// One control tick. `Some` is a terminal status for the goal.
    fn execute_cycle(&self, exec: &mut GoalExecution) -> Option<TerminalStatus> {
        // Pin the collaborator set for the whole tick; hot-swaps wait at
        // this lock.
        let mut collaborators = self.collaborators.lock();

        let (oscillation_timeout, oscillation_distance, controller_patience, recovery_enabled) = {
            let config = self.config.read();
            (
                config.oscillation.timeout,
                config.oscillation.distance,
                config.controller.controller_patience,
                config.recovery.recovery_behavior_enabled,
            )
        };

        let pose = match self.robot_pose() {
            Ok(pose) => pose,
            Err(e) => {
                if exec.pose_warn.ready() {
                    tracing::warn!("Cannot read the robot pose, skipping this tick: {}", e);
                }
                return None;
            }
        };
        self.server.feedback.publish(Feedback {
            base_position: pose.clone(),
        });

        // Displacement resets the oscillation window; if the last
        // escalation was for oscillation, it is forgiven too.
        if exec
            .oscillation
            .note_pose(pose.position.x, pose.position.y, oscillation_distance)
            && self.shared.recovery_trigger() == RecoveryTrigger::Oscillation
        {
            exec.ladder.reset();
        }

        // Never command the base on stale sensor data.
        if !self.controller_costmap.lock().is_current() {
            if exec.stale_warn.ready() {
                tracing::warn!("Sensor data is out of date, not commanding the base for safety");
            }
            self.topics.publish_zero_velocity();
            return None;
        }

        // Hand a freshly produced plan to the controller.
        let fresh = self.shared.inner.lock().plans.consume();
        if let Some(plan) = fresh {
            tracing::debug!("Got a new plan, swapping handles");
            if !collaborators.local.set_plan(plan) {
                tracing::error!("Failed to pass global plan to the controller, aborting");
                self.reset_state();
                return Some(TerminalStatus::Aborted(
                    "Failed to pass global plan to the controller.".to_string(),
                ));
            }
            if self.shared.recovery_trigger() == RecoveryTrigger::PlanningFailed {
                exec.ladder.reset();
            }
        }

        match self.shared.state() {
            NavState::Planning => {
                {
                    let mut inner = self.shared.inner.lock();
                    inner.run_planner = true;
                    self.shared.wake.notify_one();
                }
                tracing::debug!("Waiting for a plan");
            }

            NavState::Controlling => {
                if collaborators.local.is_goal_reached(&pose) {
                    tracing::debug!("Goal reached");
                    self.reset_state();
                    return Some(TerminalStatus::Succeeded);
                }

                if exec.oscillation.timed_out(oscillation_timeout) {
                    tracing::warn!(
                        "No displacement for {:.1}s, escalating to recovery",
                        oscillation_timeout
                    );
                    self.topics.publish_zero_velocity();
                    let mut inner = self.shared.inner.lock();
                    inner.state = NavState::Clearing;
                    inner.recovery_trigger = RecoveryTrigger::Oscillation;
                    // Recovery is strictly serialized with planning.
                    inner.run_planner = false;
                } else {
                    match collaborators.local.compute_velocity(&pose) {
                        Some(twist) => {
                            tracing::debug!(
                                "Valid command from the local planner: {:.3}, {:.3}, {:.3}",
                                twist.linear_x,
                                twist.linear_y,
                                twist.angular_z
                            );
                            exec.last_valid_control = Instant::now();
                            self.topics.cmd_vel.publish(twist);
                            if self.shared.recovery_trigger() == RecoveryTrigger::ControllingFailed
                            {
                                exec.ladder.reset();
                            }
                        }
                        None => {
                            tracing::debug!("The local planner could not find a valid velocity");
                            if supervision::control_patience_exhausted(
                                exec.last_valid_control,
                                controller_patience,
                            ) {
                                self.topics.publish_zero_velocity();
                                let mut inner = self.shared.inner.lock();
                                inner.state = NavState::Clearing;
                                inner.recovery_trigger = RecoveryTrigger::ControllingFailed;
                                inner.run_planner = false;
                            } else {
                                // Still within patience: ask for a fresh
                                // plan instead of escalating.
                                self.topics.publish_zero_velocity();
                                let mut inner = self.shared.inner.lock();
                                inner.last_valid_plan = Instant::now();
                                inner.planning_retries = 0;
                                inner.state = NavState::Planning;
                                inner.run_planner = true;
                                self.shared.wake.notify_one();
                            }
                        }
                    }
                }
            }

            NavState::Clearing => {
                let total = collaborators.recoveries.len();
                if recovery_enabled && !exec.ladder.exhausted(total) {
                    let index = exec.ladder.index();
                    let entry = &mut collaborators.recoveries[index];
                    tracing::info!(
                        "Executing recovery behavior {} of {}: {}",
                        index + 1,
                        total,
                        entry.name
                    );
                    self.topics.recovery_status.publish(RecoveryStatus {
                        pose: pose.clone(),
                        current_index: index,
                        total,
                        name: entry.name.clone(),
                    });

                    entry.behavior.run();

                    // Give the robot time to get moving again, and the
                    // planner a clean patience window.
                    exec.oscillation.touch();
                    {
                        let mut inner = self.shared.inner.lock();
                        inner.last_valid_plan = Instant::now();
                        inner.planning_retries = 0;
                        inner.state = NavState::Planning;
                    }
                    exec.ladder.advance();
                } else {
                    let trigger = self.shared.recovery_trigger();
                    tracing::error!(
                        "All recovery behaviors have failed (trigger {:?}), aborting",
                        trigger
                    );
                    self.shared.stop_planner();
                    let reason = trigger.abort_reason().to_string();
                    self.reset_state();
                    return Some(TerminalStatus::Aborted(reason));
                }
            }
        }

        None
    }

    /// Return the machine to idle: worker stopped, state Planning, zero
    /// velocity, costmaps optionally shut down.
    fn reset_state(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.run_planner = false;
            inner.state = NavState::Planning;
            inner.recovery_trigger = RecoveryTrigger::PlanningFailed;
        }
        self.topics.publish_zero_velocity();

        if self.config.read().costmap.shutdown_costmaps {
            tracing::debug!("Stopping costmaps");
            self.planner_costmap.lock().stop();
            self.controller_costmap.lock().stop();
        }
    }

    /// Robot pose in the planning frame.
    fn robot_pose(&self) -> std::result::Result<PoseStamped, TransformError> {
        let global_frame = self.planner_costmap.lock().global_frame().to_string();
        let base_frame = self.config.read().frames.robot_base_frame.clone();
        self.tf
            .transform(&PoseStamped::new(&base_frame, 0.0, 0.0, 0.0), &global_frame)
    }

    /// Best effort: on a transform failure the goal is kept in its
    /// original frame.
    fn goal_to_global_frame(&self, goal: &PoseStamped) -> PoseStamped {
        let global_frame = self.planner_costmap.lock().global_frame().to_string();
        match self.tf.transform(goal, &global_frame) {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!(
                    "Failed to transform the goal pose from {} into the {} frame: {}",
                    goal.frame_id,
                    global_frame,
                    e
                );
                goal.clone()
            }
        }
    }

    /// Plan-on-demand: compute a path without executing it. Rejected
    /// while a goal is active so the two cannot thrash shared costmap
    /// state. An empty plan means no path was found within tolerance.
    pub fn make_plan(
        &self,
        start: Option<PoseStamped>,
        goal: &PoseStamped,
        tolerance: f32,
    ) -> Result<Plan> {
        if self.server.is_active() {
            return Err(SarathiError::Service(
                "the coordinator must be inactive to plan for an external user".to_string(),
            ));
        }

        let start = match start {
            Some(start) => start,
            None => self.robot_pose().map_err(|e| {
                SarathiError::Service(format!("cannot plan without a start pose: {}", e))
            })?,
        };

        let (clear_costmap, add_unreachable_goal, clearing_radius) = {
            let config = self.config.read();
            (
                config.make_plan.clear_costmap,
                config.make_plan.add_unreachable_goal,
                config.recovery.clearing_radius,
            )
        };

        if clear_costmap {
            self.clear_costmap_windows(2.0 * clearing_radius, 2.0 * clearing_radius);
        }

        let planner = Arc::clone(&self.collaborators.lock().global);
        let mut planner = planner.lock();

        // The exact goal first.
        if let Some(plan) = planner.make_plan(&start, goal) {
            if !plan.is_empty() {
                return Ok(plan);
            }
        }

        tracing::debug!(
            "No plan to the exact goal of ({:.2}, {:.2}), searching within tolerance",
            goal.position.x,
            goal.position.y
        );

        let resolution = self.planner_costmap.lock().resolution();
        let mut search_increment = resolution * 3.0;
        if tolerance > 0.0 && tolerance < search_increment {
            search_increment = tolerance;
        }

        // Outward square-lattice search. Each pass visits only the outer
        // ring of its shell; cells strictly inside were covered by earlier
        // shells. A tolerance that is not a multiple of the increment
        // leaves the partial outermost shell unvisited.
        let eps = 1e-5f32;
        let mut candidate = goal.clone();
        let mut max_offset = search_increment;
        while max_offset <= tolerance + eps {
            let mut y_offset = 0.0f32;
            while y_offset <= max_offset + eps {
                let mut x_offset = 0.0f32;
                while x_offset <= max_offset + eps {
                    if x_offset < max_offset - eps && y_offset < max_offset - eps {
                        x_offset += search_increment;
                        continue;
                    }

                    for &y_mult in &[-1.0f32, 1.0] {
                        if y_offset < eps && y_mult < 0.0 {
                            continue;
                        }
                        for &x_mult in &[-1.0f32, 1.0] {
                            if x_offset < eps && x_mult < 0.0 {
                                continue;
                            }

                            candidate.position.x = goal.position.x + x_offset * x_mult;
                            candidate.position.y = goal.position.y + y_offset * y_mult;

                            if let Some(mut plan) = planner.make_plan(&start, &candidate) {
                                if !plan.is_empty() {
                                    if add_unreachable_goal {
                                        // Leave the original goal at the
                                        // end as a hint for downstream
                                        // local planning.
                                        plan.push(goal.clone());
                                    }
                                    tracing::debug!(
                                        "Found a plan to point ({:.2}, {:.2})",
                                        candidate.position.x,
                                        candidate.position.y
                                    );
                                    return Ok(plan);
                                }
                            }
                        }
                    }

                    x_offset += search_increment;
                }
                y_offset += search_increment;
            }
            max_offset += search_increment;
        }

        Ok(Plan::new())
    }

    /// Reset every layer of both costmaps back to the static map.
    pub fn clear_costmaps(&self) {
        self.controller_costmap.lock().reset_layers();
        self.planner_costmap.lock().reset_layers();
    }

    /// Free a window around the robot in both costmaps.
    fn clear_costmap_windows(&self, size_x: f32, size_y: f32) {
        let base_frame = self.config.read().frames.robot_base_frame.clone();

        for costmap in [&self.planner_costmap, &self.controller_costmap] {
            let frame = costmap.lock().global_frame().to_string();
            let pose = match self
                .tf
                .transform(&PoseStamped::new(&base_frame, 0.0, 0.0, 0.0), &frame)
            {
                Ok(pose) => pose,
                Err(e) => {
                    tracing::warn!("Cannot clear a costmap window without the robot pose: {}", e);
                    continue;
                }
            };

            let x = pose.position.x;
            let y = pose.position.y;
            let window = [
                (x - size_x / 2.0, y - size_y / 2.0),
                (x + size_x / 2.0, y - size_y / 2.0),
                (x + size_x / 2.0, y + size_y / 2.0),
                (x - size_x / 2.0, y + size_y / 2.0),
            ];
            costmap.lock().set_convex_polygon_cost(&window, cost::FREE);
        }
    }

    /// Apply a new configuration at runtime. Planner swaps construct the
    /// replacement first and roll back (instance and configured name) if
    /// that fails; reconfiguring to the current name is a no-op.
    pub fn reconfigure(&self, mut new_config: SarathiConfig) {
        let mut collaborators = self.collaborators.lock();

        if new_config.planner.base_global_planner != collaborators.global_name {
            let name = new_config.planner.base_global_planner.clone();
            tracing::info!("Loading global planner {}", name);
            match self.registry.create_global(&name, &self.plugin_ctx) {
                Ok(instance) => {
                    self.reset_for_swap();
                    collaborators.global = Arc::new(Mutex::new(instance));
                    collaborators.global_name = name;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to create the {} planner: {}. Keeping the current planner.",
                        name,
                        e
                    );
                    new_config.planner.base_global_planner = collaborators.global_name.clone();
                }
            }
        }

        if new_config.controller.base_local_planner != collaborators.local_name {
            let name = new_config.controller.base_local_planner.clone();
            tracing::info!("Loading local planner {}", name);
            match self.registry.create_local(&name, &self.plugin_ctx) {
                Ok(instance) => {
                    self.reset_for_swap();
                    collaborators.local = instance;
                    collaborators.local_name = name;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to create the {} planner: {}. Keeping the current planner.",
                        name,
                        e
                    );
                    new_config.controller.base_local_planner = collaborators.local_name.clone();
                }
            }
        }

        let current_behaviors = self.config.read().recovery.behaviors.clone();
        if new_config.recovery.behaviors != current_behaviors {
            if new_config.recovery.behaviors.is_empty() {
                tracing::info!("Loading the default recovery behaviors");
                collaborators.recoveries = default_ladder(&new_config, &self.plugin_ctx);
            } else {
                match build_configured_ladder(
                    &new_config.recovery.behaviors,
                    &self.registry,
                    &self.plugin_ctx,
                ) {
                    Ok(ladder) => collaborators.recoveries = ladder,
                    Err(e) => {
                        tracing::error!("{}. Keeping the current recovery behaviors.", e);
                        new_config.recovery.behaviors = current_behaviors;
                    }
                }
            }
        }

        *self.config.write() = new_config;
    }

    /// Drop all plan slots and return to `Planning` before a collaborator
    /// swap, so nothing stale crosses the seam.
    fn reset_for_swap(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.plans.clear();
            inner.run_planner = false;
            inner.state = NavState::Planning;
            inner.recovery_trigger = RecoveryTrigger::PlanningFailed;
        }
        self.topics.publish_zero_velocity();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(handle) = self.planner_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Planner thread panicked");
            }
        }
    }
}

/// Build the recovery ladder: the configured list when it validates, the
/// built-in defaults otherwise.
fn build_recovery_ladder(
    config: &SarathiConfig,
    registry: &PluginRegistry,
    ctx: &PluginContext,
) -> Vec<RecoveryEntry> {
    if !config.recovery.behaviors.is_empty() {
        match build_configured_ladder(&config.recovery.behaviors, registry, ctx) {
            Ok(ladder) => return ladder,
            Err(e) => {
                tracing::error!("{}. Using the default recovery behaviors instead.", e);
            }
        }
    }
    default_ladder(config, ctx)
}

fn build_configured_ladder(
    specs: &[RecoveryBehaviorSpec],
    registry: &PluginRegistry,
    ctx: &PluginContext,
) -> Result<Vec<RecoveryEntry>> {
    for (i, spec) in specs.iter().enumerate() {
        if spec.name.is_empty() || spec.kind.is_empty() {
            return Err(SarathiError::Config(
                "recovery behaviors must have a name and a type".to_string(),
            ));
        }
        if specs[i + 1..].iter().any(|other| other.name == spec.name) {
            return Err(SarathiError::Config(format!(
                "a recovery behavior with the name {:?} already exists, this is not allowed",
                spec.name
            )));
        }
        if !registry.has_recovery(&spec.kind) {
            return Err(SarathiError::Config(format!(
                "unknown recovery behavior type {:?}",
                spec.kind
            )));
        }
    }

    let mut ladder = Vec::with_capacity(specs.len());
    for spec in specs {
        let behavior = registry.create_recovery(&spec.kind, ctx)?;
        ladder.push(RecoveryEntry {
            name: spec.name.clone(),
            behavior,
        });
    }
    Ok(ladder)
}

/// Default escalation: conservative clear, rotate, aggressive clear,
/// rotate. Rotations are skipped when in-place rotation is not allowed.
fn default_ladder(config: &SarathiConfig, ctx: &PluginContext) -> Vec<RecoveryEntry> {
    let mut ladder = Vec::new();

    ladder.push(RecoveryEntry {
        name: "conservative_reset".to_string(),
        behavior: Box::new(ClearCostmapRecovery::new(
            "conservative_reset",
            config.recovery.conservative_reset_dist,
            Arc::clone(&ctx.planner_costmap),
            Arc::clone(&ctx.controller_costmap),
            Arc::clone(&ctx.tf),
            &ctx.robot_base_frame,
        )),
    });

    if config.recovery.clearing_rotation_allowed {
        ladder.push(RecoveryEntry {
            name: "rotate_recovery".to_string(),
            behavior: Box::new(RotateRecovery::new(ctx.topics.clone(), ROTATE_RECOVERY_VEL)),
        });
    }

    ladder.push(RecoveryEntry {
        name: "aggressive_reset".to_string(),
        behavior: Box::new(ClearCostmapRecovery::new(
            "aggressive_reset",
            config.costmap.circumscribed_radius * 4.0,
            Arc::clone(&ctx.planner_costmap),
            Arc::clone(&ctx.controller_costmap),
            Arc::clone(&ctx.tf),
            &ctx.robot_base_frame,
        )),
    });

    if config.recovery.clearing_rotation_allowed {
        ladder.push(RecoveryEntry {
            name: "rotate_recovery".to_string(),
            behavior: Box::new(RotateRecovery::new(ctx.topics.clone(), ROTATE_RECOVERY_VEL)),
        });
    }

    ladder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryConfig;
    use crate::costmap::Costmap;
    use crate::plugins::RecoveryBehavior;
    use crate::transform::StaticTransforms;

    struct NoopRecovery;

    impl RecoveryBehavior for NoopRecovery {
        fn run(&mut self) {}
    }

    fn context() -> PluginContext {
        PluginContext {
            planner_costmap: Costmap::new("global_costmap", "map", 10, 10, 0.1, 0.0, 0.0)
                .into_shared(),
            controller_costmap: Costmap::new("local_costmap", "map", 10, 10, 0.1, 0.0, 0.0)
                .into_shared(),
            tf: Arc::new(StaticTransforms::new()),
            topics: NavTopics::new(),
            robot_base_frame: "base_link".to_string(),
        }
    }

    fn registry_with_noop() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register_recovery("noop", |_| Ok(Box::new(NoopRecovery)));
        registry
    }

    fn spec(name: &str, kind: &str) -> RecoveryBehaviorSpec {
        RecoveryBehaviorSpec {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_configured_ladder_preserves_order() {
        let registry = registry_with_noop();
        let ladder = build_configured_ladder(
            &[spec("first", "noop"), spec("second", "noop")],
            &registry,
            &context(),
        )
        .unwrap();
        assert_eq!(ladder[0].name, "first");
        assert_eq!(ladder[1].name, "second");
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let registry = registry_with_noop();
        let result = build_configured_ladder(
            &[spec("twice", "noop"), spec("twice", "noop")],
            &registry,
            &context(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let registry = registry_with_noop();
        let result =
            build_configured_ladder(&[spec("only", "missing")], &registry, &context());
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_list_falls_back_to_defaults() {
        let registry = registry_with_noop();
        let config = SarathiConfig {
            recovery: RecoveryConfig {
                behaviors: vec![spec("twice", "noop"), spec("twice", "noop")],
                ..RecoveryConfig::default()
            },
            ..SarathiConfig::default()
        };

        let ladder = build_recovery_ladder(&config, &registry, &context());
        let names: Vec<&str> = ladder.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "conservative_reset",
                "rotate_recovery",
                "aggressive_reset",
                "rotate_recovery"
            ]
        );
    }

    #[test]
    fn test_default_ladder_without_rotation() {
        let config = SarathiConfig {
            recovery: RecoveryConfig {
                clearing_rotation_allowed: false,
                ..RecoveryConfig::default()
            },
            ..SarathiConfig::default()
        };

        let ladder = default_ladder(&config, &context());
        let names: Vec<&str> = ladder.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["conservative_reset", "aggressive_reset"]);
    }
}
