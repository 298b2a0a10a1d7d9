//! Action endpoint for navigation goals.
//!
//! Models the goal channel of the coordinator: a latest-wins pending goal
//! slot with a cancel flag, plus feedback and terminal-status topics. A
//! second goal submitted while one is executing preempts it in place; the
//! control loop picks the new goal up at its next tick without tearing
//! anything down.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::topics::Topic;
use crate::types::PoseStamped;

/// Terminal status of one navigation goal.
#[derive(Clone, Debug, PartialEq)]
pub enum TerminalStatus {
    Succeeded,
    Aborted(String),
    Preempted,
}

/// Periodic progress report for the active goal.
#[derive(Clone, Debug)]
pub struct Feedback {
    pub base_position: PoseStamped,
}

struct ActionInner {
    pending: Option<PoseStamped>,
    cancel_requested: bool,
    active: bool,
}

struct ActionState {
    inner: Mutex<ActionInner>,
    arrived: Condvar,
}

/// Single-goal action endpoint.
pub struct ActionServer {
    state: Arc<ActionState>,
    /// Per-tick pose feedback for the active goal
    pub feedback: Topic<Feedback>,
    /// Terminal status, one message per completed goal
    pub result: Topic<TerminalStatus>,
    /// Republished wrapped goals from `send_pose`
    action_goal: Topic<PoseStamped>,
}

impl ActionServer {
    pub fn new(action_goal: Topic<PoseStamped>) -> Self {
        Self {
            state: Arc::new(ActionState {
                inner: Mutex::new(ActionInner {
                    pending: None,
                    cancel_requested: false,
                    active: false,
                }),
                arrived: Condvar::new(),
            }),
            feedback: Topic::new(),
            result: Topic::new(),
            action_goal,
        }
    }

    /// Submit a goal. Replaces any goal still waiting to be accepted.
    pub fn send_goal(&self, goal: PoseStamped) {
        let mut inner = self.state.inner.lock();
        inner.pending = Some(goal);
        self.state.arrived.notify_all();
    }

    /// Accept a bare pose from the goal topic: wrap it, republish it for
    /// tooling, and submit it through the action channel.
    pub fn send_pose(&self, pose: PoseStamped) {
        tracing::debug!("Wrapping a bare pose from the goal topic into an action goal");
        self.action_goal.publish(pose.clone());
        self.send_goal(pose);
    }

    /// Request cancellation. Drops a not-yet-accepted goal outright;
    /// flags an executing goal for preemption.
    pub fn cancel(&self) {
        let mut inner = self.state.inner.lock();
        if inner.active {
            inner.cancel_requested = true;
        } else {
            inner.pending = None;
        }
        self.state.arrived.notify_all();
    }

    /// Block until a goal arrives or the timeout elapses.
    pub fn wait_for_goal(&self, timeout: Duration) -> Option<PoseStamped> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.state.inner.lock();
        loop {
            if let Some(goal) = inner.pending.take() {
                return Some(goal);
            }
            if self.state.arrived.wait_until(&mut inner, deadline).timed_out() {
                return inner.pending.take();
            }
        }
    }

    /// True while a new goal or a cancel is waiting for the control loop.
    pub fn preempt_requested(&self) -> bool {
        let inner = self.state.inner.lock();
        inner.pending.is_some() || inner.cancel_requested
    }

    /// Take the preempting goal, if one is waiting.
    pub fn accept_new_goal(&self) -> Option<PoseStamped> {
        self.state.inner.lock().pending.take()
    }

    /// Read and clear the cancel flag.
    pub fn take_cancel(&self) -> bool {
        let mut inner = self.state.inner.lock();
        std::mem::take(&mut inner.cancel_requested)
    }

    pub fn set_active(&self, active: bool) {
        let mut inner = self.state.inner.lock();
        inner.active = active;
        if !active {
            inner.cancel_requested = false;
        }
    }

    /// True while a goal is executing. The plan-on-demand service is
    /// exclusive with an active goal.
    pub fn is_active(&self) -> bool {
        self.state.inner.lock().active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ActionServer {
        ActionServer::new(Topic::new())
    }

    #[test]
    fn test_latest_goal_wins() {
        let server = server();
        server.send_goal(PoseStamped::new("map", 1.0, 0.0, 0.0));
        server.send_goal(PoseStamped::new("map", 2.0, 0.0, 0.0));

        let goal = server.accept_new_goal().unwrap();
        assert_eq!(goal.position.x, 2.0);
        assert!(server.accept_new_goal().is_none());
    }

    #[test]
    fn test_cancel_drops_pending_goal() {
        let server = server();
        server.send_goal(PoseStamped::new("map", 1.0, 0.0, 0.0));
        server.cancel();

        assert!(!server.preempt_requested());
        assert!(server.accept_new_goal().is_none());
    }

    #[test]
    fn test_cancel_flags_active_goal() {
        let server = server();
        server.set_active(true);
        server.cancel();

        assert!(server.preempt_requested());
        assert!(server.take_cancel());
        assert!(!server.take_cancel());
    }

    #[test]
    fn test_deactivation_clears_cancel() {
        let server = server();
        server.set_active(true);
        server.cancel();
        server.set_active(false);
        assert!(!server.preempt_requested());
    }

    #[test]
    fn test_send_pose_republishes() {
        let action_goal = Topic::new();
        let rx = action_goal.subscribe();
        let server = ActionServer::new(action_goal);

        server.send_pose(PoseStamped::new("map", 0.5, 0.5, 0.0));
        assert_eq!(rx.recv().unwrap().position.x, 0.5);
        assert!(server.accept_new_goal().is_some());
    }

    #[test]
    fn test_wait_for_goal_times_out() {
        let server = server();
        assert!(server.wait_for_goal(Duration::from_millis(10)).is_none());
    }
}
