//! Plan hand-off buffer between the planner worker and the control loop.
//!
//! Three slots: the worker writes into `producer` and swaps it with
//! `handoff`; the control loop swaps `handoff` into `consumer` when it
//! observes the fresh flag. Slots hold `Arc` handles, so every exchange is
//! a pointer move and the control loop always sees the most recent plan
//! without ever waiting behind a planning iteration.

use std::mem;
use std::sync::Arc;

use crate::types::Plan;

#[derive(Debug)]
pub struct PlanBuffer {
    producer: Arc<Plan>,
    handoff: Arc<Plan>,
    consumer: Arc<Plan>,
    fresh: bool,
}

impl PlanBuffer {
    pub fn new() -> Self {
        Self {
            producer: Arc::new(Plan::new()),
            handoff: Arc::new(Plan::new()),
            consumer: Arc::new(Plan::new()),
            fresh: false,
        }
    }

    /// Worker side: publish a newly computed plan. Overwrites an
    /// unconsumed previous plan; the control loop only ever wants the
    /// latest one.
    pub fn publish(&mut self, plan: Plan) {
        self.producer = Arc::new(plan);
        mem::swap(&mut self.producer, &mut self.handoff);
        self.fresh = true;
    }

    pub fn has_fresh(&self) -> bool {
        self.fresh
    }

    /// Control side: take the latest plan if one is waiting.
    pub fn consume(&mut self) -> Option<Arc<Plan>> {
        if !self.fresh {
            return None;
        }
        mem::swap(&mut self.handoff, &mut self.consumer);
        self.fresh = false;
        Some(Arc::clone(&self.consumer))
    }

    /// Drop all three slots. Used on goal changes and collaborator swaps
    /// so a stale plan can never reach the controller.
    pub fn clear(&mut self) {
        self.producer = Arc::new(Plan::new());
        self.handoff = Arc::new(Plan::new());
        self.consumer = Arc::new(Plan::new());
        self.fresh = false;
    }
}

impl Default for PlanBuffer {
    fn default() -> Self {
        Self::new()
    }
}
