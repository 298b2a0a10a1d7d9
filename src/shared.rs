//! Shared state between the control loop and the planner worker.
//!
//! One mutex guards everything the two threads exchange: the current goal,
//! the worker run flag, the plan buffer, the coordinator state machine,
//! and the planning patience bookkeeping. The paired condition variable
//! wakes the worker on goal arrival, preemption, frame changes, forced
//! replans, cadence timer expiry, and shutdown. The mutex is never held
//! across a call into a collaborator.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

use crate::buffer::PlanBuffer;
use crate::types::PoseStamped;

/// Coordinator state machine. Exactly one state holds at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavState {
    /// No usable plan yet, waiting on the worker
    Planning,
    /// Feeding the local planner, emitting velocities
    Controlling,
    /// Running a recovery behavior
    Clearing,
}

/// Why the coordinator entered `Clearing`. Decides the abort message when
/// the recovery ladder is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryTrigger {
    PlanningFailed,
    ControllingFailed,
    Oscillation,
}

impl RecoveryTrigger {
    /// Abort reason reported when every recovery behavior has run and the
    /// underlying failure persists.
    pub fn abort_reason(&self) -> &'static str {
        match self {
            RecoveryTrigger::PlanningFailed => {
                "Failed to find a valid plan. Even after executing recovery behaviors."
            }
            RecoveryTrigger::ControllingFailed => {
                "Failed to find a valid control. Even after executing recovery behaviors."
            }
            RecoveryTrigger::Oscillation => {
                "Robot is oscillating. Even after executing recovery behaviors."
            }
        }
    }
}

/// Everything guarded by the planner mutex.
#[derive(Debug)]
pub struct NavInner {
    /// Goal the worker should plan toward, in the planning frame
    pub goal: Option<PoseStamped>,
    /// Whether the worker should be planning
    pub run_planner: bool,
    /// Process shutdown; observed by the worker at its next wait point
    pub shutdown: bool,
    pub state: NavState,
    pub recovery_trigger: RecoveryTrigger,
    pub plans: PlanBuffer,
    /// Last time a non-empty plan was produced
    pub last_valid_plan: Instant,
    /// Failed attempts since `last_valid_plan`
    pub planning_retries: u32,
}

impl NavInner {
    fn new() -> Self {
        Self {
            goal: None,
            run_planner: false,
            shutdown: false,
            state: NavState::Planning,
            recovery_trigger: RecoveryTrigger::PlanningFailed,
            plans: PlanBuffer::new(),
            last_valid_plan: Instant::now(),
            planning_retries: 0,
        }
    }
}

/// The planner mutex and its condition variable.
pub struct NavShared {
    pub inner: Mutex<NavInner>,
    pub wake: Condvar,
}

impl NavShared {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(NavInner::new()),
            wake: Condvar::new(),
        }
    }

    /// Point the worker at a (new) goal and wake it. Clears any plan
    /// produced for a previous goal so the controller can never consume
    /// one that does not match.
    pub fn start_goal(&self, goal: PoseStamped) {
        let mut inner = self.inner.lock();
        inner.goal = Some(goal);
        inner.run_planner = true;
        inner.state = NavState::Planning;
        inner.plans.clear();
        inner.last_valid_plan = Instant::now();
        inner.planning_retries = 0;
        self.wake.notify_one();
    }

    /// Stop the worker without touching the rest of the machine.
    pub fn stop_planner(&self) {
        let mut inner = self.inner.lock();
        inner.run_planner = false;
    }

    /// Ask the worker thread to exit; it observes the flag at its next
    /// wait point.
    pub fn request_shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        self.wake.notify_all();
    }

    pub fn state(&self) -> NavState {
        self.inner.lock().state
    }

    pub fn recovery_trigger(&self) -> RecoveryTrigger {
        self.inner.lock().recovery_trigger
    }
}

impl Default for NavShared {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let shared = NavShared::new();
        let inner = shared.inner.lock();
        assert_eq!(inner.state, NavState::Planning);
        assert!(!inner.run_planner);
        assert!(inner.goal.is_none());
    }

    #[test]
    fn test_start_goal_resets_patience_and_buffer() {
        let shared = NavShared::new();
        {
            let mut inner = shared.inner.lock();
            inner.plans.publish(vec![PoseStamped::new("map", 1.0, 0.0, 0.0)]);
            inner.planning_retries = 5;
            inner.state = NavState::Clearing;
        }

        shared.start_goal(PoseStamped::new("map", 2.0, 0.0, 0.0));

        let mut inner = shared.inner.lock();
        assert_eq!(inner.state, NavState::Planning);
        assert!(inner.run_planner);
        assert_eq!(inner.planning_retries, 0);
        assert!(inner.plans.consume().is_none());
    }

    #[test]
    fn test_abort_reasons_name_the_failure() {
        assert!(RecoveryTrigger::PlanningFailed.abort_reason().contains("valid plan"));
        assert!(RecoveryTrigger::ControllingFailed.abort_reason().contains("valid control"));
        assert!(RecoveryTrigger::Oscillation.abort_reason().contains("oscillating"));
    }
}
