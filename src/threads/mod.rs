//! Background threads of the coordinator.
//!
//! Only one matters to the core: the planner worker, which turns the
//! current goal into a global path on its own schedule. The control loop
//! runs on whichever thread services the action endpoint.

mod planner;

pub use planner::PlannerContext;

use std::thread::{self, JoinHandle};

/// Spawn the planner worker.
pub fn spawn_planner(ctx: PlannerContext) -> JoinHandle<()> {
    thread::Builder::new()
        .name("planner".into())
        .spawn(move || planner::run(ctx))
        .expect("Failed to spawn planner thread")
}
