//! Planner worker: background loop that turns the current goal into a
//! global path.
//!
//! Protocol with the control loop: a condition variable plus the shared
//! run flag and goal cell. The worker suspends until `run_planner` and a
//! goal are both present, copies the goal and the planner handle out under
//! their locks, and plans with the planner mutex released so the control
//! loop is never stalled behind a planning iteration. The predicate is
//! re-checked after every wake to tolerate spurious wakeups and coalesced
//! signals.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SarathiConfig;
use crate::costmap::SharedCostmap;
use crate::plugins::Collaborators;
use crate::shared::{NavShared, NavState, RecoveryTrigger};
use crate::supervision;
use crate::topics::NavTopics;
use crate::transform::TransformService;
use crate::types::{Plan, PoseStamped};

/// Everything the worker needs, cloned out of the coordinator at spawn.
pub struct PlannerContext {
    pub shared: Arc<NavShared>,
    pub collaborators: Arc<Mutex<Collaborators>>,
    pub planner_costmap: SharedCostmap,
    pub tf: Arc<dyn TransformService>,
    pub topics: NavTopics,
    pub config: Arc<RwLock<SarathiConfig>>,
}

pub(super) fn run(ctx: PlannerContext) {
    tracing::debug!("Planner worker started");

    // Deadline of the cadence sleep after an iteration, when a replanning
    // frequency is configured. Any wake ends the sleep: either the timer
    // poked the condvar or something urgent (new goal, forced replan)
    // wants an immediate iteration.
    let mut cadence_deadline: Option<Instant> = None;

    let mut inner = ctx.shared.inner.lock();
    loop {
        // Suspend until there is work, re-checking the predicate after
        // every wake.
        let goal = loop {
            if inner.shutdown {
                tracing::debug!("Planner worker shutting down");
                return;
            }
            if let Some(deadline) = cadence_deadline {
                if Instant::now() < deadline {
                    ctx.shared.wake.wait_until(&mut inner, deadline);
                }
                cadence_deadline = None;
                continue;
            }
            match inner.goal.clone() {
                Some(goal) if inner.run_planner => break goal,
                _ => {
                    ctx.shared.wake.wait(&mut inner);
                }
            }
        };

        let iteration_start = Instant::now();
        drop(inner);

        let (frequency, patience, max_retries) = {
            let config = ctx.config.read();
            (
                config.planner.planner_frequency,
                config.planner.planner_patience,
                config.planner.max_planning_retries,
            )
        };

        tracing::debug!(
            "Planning toward ({:.2}, {:.2})",
            goal.position.x,
            goal.position.y
        );
        let plan = plan_once(&ctx, &goal);

        inner = ctx.shared.inner.lock();
        if inner.goal.as_ref() != Some(&goal) {
            // The goal changed while we were planning; the result belongs
            // to nobody.
            tracing::debug!("Discarding a plan computed for a superseded goal");
        } else {
            match plan {
                Some(plan) if !plan.is_empty() => {
                    tracing::debug!("Got a plan with {} poses", plan.len());
                    inner.plans.publish(plan);
                    inner.last_valid_plan = Instant::now();
                    inner.planning_retries = 0;
                    if inner.run_planner && inner.state == NavState::Planning {
                        inner.state = NavState::Controlling;
                    }
                    if frequency <= 0.0 {
                        // Plan-once mode: back to sleep until someone asks
                        // again.
                        inner.run_planner = false;
                    }
                }
                _ => {
                    inner.planning_retries = inner.planning_retries.saturating_add(1);
                    tracing::debug!("No plan (attempt {})", inner.planning_retries);

                    if inner.state == NavState::Planning
                        && inner.run_planner
                        && supervision::planning_patience_exhausted(
                            inner.last_valid_plan,
                            patience,
                            inner.planning_retries,
                            max_retries,
                        )
                    {
                        tracing::warn!(
                            "No valid plan within patience, escalating to recovery"
                        );
                        ctx.topics.publish_zero_velocity();
                        inner.state = NavState::Clearing;
                        inner.recovery_trigger = RecoveryTrigger::PlanningFailed;
                        inner.run_planner = false;
                    }
                }
            }
        }

        if frequency > 0.0 {
            cadence_deadline = Some(iteration_start + Duration::from_secs_f32(1.0 / frequency));
        }
    }
}

/// One planning attempt: robot pose as start, current global planner,
/// planner mutex released throughout.
fn plan_once(ctx: &PlannerContext, goal: &PoseStamped) -> Option<Plan> {
    let global_frame = ctx.planner_costmap.lock().global_frame().to_string();
    let base_frame = ctx.config.read().frames.robot_base_frame.clone();

    let origin = PoseStamped::new(&base_frame, 0.0, 0.0, 0.0);
    let start = match ctx.tf.transform(&origin, &global_frame) {
        Ok(pose) => pose,
        Err(e) => {
            tracing::warn!("Unable to get the starting pose of the robot: {}", e);
            return None;
        }
    };

    // Copy the handle out so a hot-swap mid-planning cannot invalidate it;
    // the instance we call is the one that was active when the iteration
    // began.
    let planner = Arc::clone(&ctx.collaborators.lock().global);
    let plan = planner.lock().make_plan(&start, goal);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costmap::Costmap;
    use crate::plugins::{GlobalPlanner, LocalPlanner};
    use crate::transform::{StaticTransforms, Transform2D};
    use crate::types::Twist;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SequencedPlanner {
        calls: Arc<AtomicUsize>,
    }

    impl GlobalPlanner for SequencedPlanner {
        fn make_plan(&mut self, start: &PoseStamped, goal: &PoseStamped) -> Option<Plan> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(vec![start.clone(), goal.clone()])
        }
    }

    struct IdleController;

    impl LocalPlanner for IdleController {
        fn set_plan(&mut self, _plan: Arc<Plan>) -> bool {
            true
        }
        fn compute_velocity(&mut self, _pose: &PoseStamped) -> Option<Twist> {
            None
        }
        fn is_goal_reached(&mut self, _pose: &PoseStamped) -> bool {
            false
        }
    }

    fn context(calls: Arc<AtomicUsize>, frequency: f32) -> PlannerContext {
        let mut config = SarathiConfig::default();
        config.planner.planner_frequency = frequency;

        let tf = Arc::new(StaticTransforms::new());
        tf.set("base_link", "map", Transform2D::new(0.0, 0.0, 0.0));

        PlannerContext {
            shared: Arc::new(NavShared::new()),
            collaborators: Arc::new(Mutex::new(Collaborators {
                global: Arc::new(Mutex::new(Box::new(SequencedPlanner { calls }))),
                global_name: "sequenced".to_string(),
                local: Box::new(IdleController),
                local_name: "idle".to_string(),
                recoveries: Vec::new(),
            })),
            planner_costmap: Costmap::new("global_costmap", "map", 20, 20, 0.1, -1.0, -1.0)
                .into_shared(),
            tf,
            topics: NavTopics::new(),
            config: Arc::new(RwLock::new(config)),
        }
    }

    #[test]
    fn test_worker_plans_on_goal_and_transitions_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = context(Arc::clone(&calls), 0.0);
        let shared = Arc::clone(&ctx.shared);

        let handle = std::thread::spawn(move || run(ctx));

        shared.start_goal(PoseStamped::new("map", 0.5, 0.0, 0.0));
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        {
            let mut inner = shared.inner.lock();
            assert_eq!(inner.state, NavState::Controlling);
            // Plan-once mode goes back to sleep.
            assert!(!inner.run_planner);
            assert!(inner.plans.consume().is_some());
        }

        shared.request_shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_worker_exits_on_shutdown_while_suspended() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = context(calls, 0.0);
        let shared = Arc::clone(&ctx.shared);

        let handle = std::thread::spawn(move || run(ctx));
        std::thread::sleep(Duration::from_millis(20));

        shared.request_shutdown();
        handle.join().unwrap();
    }
}
