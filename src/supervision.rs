//! Progress and patience supervision for the control loop.
//!
//! None of these own a thread: the oscillation guard is driven by control
//! ticks, the patience checks are threshold tests on monotonic deadlines,
//! and the recovery ladder is a cursor over the configured behavior list.
//! Deadline checks are written as "now >= deadline" so a jumping simulated
//! clock can only fire them early or late, never underflow.

use std::time::{Duration, Instant};

/// Detects prolonged lack of displacement.
///
/// The anchor is the pose at the last time the robot was considered to be
/// progressing; moving `oscillation_distance` away from it resets the
/// window.
#[derive(Debug)]
pub struct OscillationGuard {
    anchor: Option<(f32, f32)>,
    last_reset: Instant,
}

impl OscillationGuard {
    pub fn new() -> Self {
        Self {
            anchor: None,
            last_reset: Instant::now(),
        }
    }

    /// Feed the current pose. Returns true when the robot has moved far
    /// enough from the anchor to count as progress (the anchor and the
    /// window restart).
    pub fn note_pose(&mut self, x: f32, y: f32, oscillation_distance: f32) -> bool {
        let progressed = match self.anchor {
            Some((ax, ay)) => (x - ax).hypot(y - ay) >= oscillation_distance,
            None => true,
        };
        if progressed {
            self.anchor = Some((x, y));
            self.last_reset = Instant::now();
        }
        progressed
    }

    /// Restart the window without moving the anchor. Called after a
    /// recovery so the robot gets time to start moving again.
    pub fn touch(&mut self) {
        self.last_reset = Instant::now();
    }

    /// Whether the progress window has expired. A timeout of zero
    /// disables oscillation detection.
    pub fn timed_out(&self, timeout_s: f32) -> bool {
        timeout_s > 0.0 && Instant::now() >= self.last_reset + Duration::from_secs_f32(timeout_s)
    }
}

impl Default for OscillationGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Planning patience: time since the last valid plan, with an optional
/// attempt-count bound. A negative `max_retries` disables the count.
pub fn planning_patience_exhausted(
    last_valid_plan: Instant,
    patience_s: f32,
    retries: u32,
    max_retries: i32,
) -> bool {
    if Instant::now() >= last_valid_plan + Duration::from_secs_f32(patience_s.max(0.0)) {
        return true;
    }
    max_retries >= 0 && retries > max_retries as u32
}

/// Control patience: time since the local planner last produced a
/// velocity.
pub fn control_patience_exhausted(last_valid_control: Instant, patience_s: f32) -> bool {
    Instant::now() >= last_valid_control + Duration::from_secs_f32(patience_s.max(0.0))
}

/// Cursor over the ordered recovery behavior list.
///
/// Non-decreasing within a goal except at the explicit reset events: a new
/// plan after a planning failure, a valid control after a control failure,
/// oscillation progress, and goal acceptance.
#[derive(Debug, Default)]
pub struct RecoveryLadder {
    index: usize,
}

impl RecoveryLadder {
    pub fn new() -> Self {
        Self { index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn exhausted(&self, total: usize) -> bool {
        self.index >= total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pose_counts_as_progress() {
        let mut guard = OscillationGuard::new();
        assert!(guard.note_pose(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_small_motion_is_not_progress() {
        let mut guard = OscillationGuard::new();
        guard.note_pose(0.0, 0.0, 0.5);
        assert!(!guard.note_pose(0.1, 0.1, 0.5));
        assert!(guard.note_pose(0.4, 0.4, 0.5));
    }

    #[test]
    fn test_zero_timeout_disables_oscillation() {
        let mut guard = OscillationGuard::new();
        guard.note_pose(0.0, 0.0, 0.5);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!guard.timed_out(0.0));
        assert!(guard.timed_out(0.001));
    }

    #[test]
    fn test_planning_patience_time_bound() {
        let stale = Instant::now() - Duration::from_secs(10);
        assert!(planning_patience_exhausted(stale, 1.0, 0, -1));
        assert!(!planning_patience_exhausted(Instant::now(), 60.0, 0, -1));
    }

    #[test]
    fn test_planning_patience_retry_bound() {
        let now = Instant::now();
        // Within the time budget, only the count can fire.
        assert!(!planning_patience_exhausted(now, 60.0, 3, 3));
        assert!(planning_patience_exhausted(now, 60.0, 4, 3));
        // Negative disables the count entirely.
        assert!(!planning_patience_exhausted(now, 60.0, 1000, -1));
    }

    #[test]
    fn test_control_patience() {
        let stale = Instant::now() - Duration::from_secs(10);
        assert!(control_patience_exhausted(stale, 1.0));
        assert!(!control_patience_exhausted(Instant::now(), 60.0));
    }

    #[test]
    fn test_ladder_cursor() {
        let mut ladder = RecoveryLadder::new();
        assert!(!ladder.exhausted(2));
        ladder.advance();
        ladder.advance();
        assert!(ladder.exhausted(2));
        ladder.reset();
        assert_eq!(ladder.index(), 0);
        assert!(ladder.exhausted(0));
    }
}
