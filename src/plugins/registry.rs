//! Name-keyed factories for the collaborator plugins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SarathiConfig;
use crate::error::{Result, SarathiError};

use super::{
    ClearCostmapRecovery, GlobalPlanner, GridPlanner, LocalPlanner, PluginContext, PursuitConfig,
    PursuitController, RecoveryBehavior, RotateRecovery,
};

type GlobalFactory = Box<dyn Fn(&PluginContext) -> Result<Box<dyn GlobalPlanner>> + Send + Sync>;
type LocalFactory = Box<dyn Fn(&PluginContext) -> Result<Box<dyn LocalPlanner>> + Send + Sync>;
type RecoveryFactory =
    Box<dyn Fn(&PluginContext) -> Result<Box<dyn RecoveryBehavior>> + Send + Sync>;

/// Open dispatch for the three collaborator kinds. Names registered here
/// are what the configuration's planner and recovery entries refer to.
#[derive(Default)]
pub struct PluginRegistry {
    global: HashMap<String, GlobalFactory>,
    local: HashMap<String, LocalFactory>,
    recovery: HashMap<String, RecoveryFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in collaborators.
    pub fn with_defaults(config: &SarathiConfig) -> Self {
        let mut registry = Self::new();

        registry.register_global("grid_planner", |ctx| {
            Ok(Box::new(GridPlanner::new(Arc::clone(&ctx.planner_costmap))))
        });

        registry.register_local("pursuit_controller", |_ctx| {
            Ok(Box::new(PursuitController::new(PursuitConfig::default())))
        });

        let reset_distance = config.recovery.conservative_reset_dist;
        registry.register_recovery("clear_costmap", move |ctx| {
            Ok(Box::new(ClearCostmapRecovery::new(
                "clear_costmap",
                reset_distance,
                Arc::clone(&ctx.planner_costmap),
                Arc::clone(&ctx.controller_costmap),
                Arc::clone(&ctx.tf),
                &ctx.robot_base_frame,
            )))
        });

        registry.register_recovery("rotate_in_place", |ctx| {
            Ok(Box::new(RotateRecovery::new(ctx.topics.clone(), 1.0)))
        });

        registry
    }

    pub fn register_global<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginContext) -> Result<Box<dyn GlobalPlanner>> + Send + Sync + 'static,
    {
        self.global.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_local<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginContext) -> Result<Box<dyn LocalPlanner>> + Send + Sync + 'static,
    {
        self.local.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_recovery<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginContext) -> Result<Box<dyn RecoveryBehavior>> + Send + Sync + 'static,
    {
        self.recovery.insert(name.to_string(), Box::new(factory));
    }

    pub fn create_global(&self, name: &str, ctx: &PluginContext) -> Result<Box<dyn GlobalPlanner>> {
        match self.global.get(name) {
            Some(factory) => factory(ctx),
            None => Err(SarathiError::Plugin(format!(
                "no global planner registered under the name {:?}",
                name
            ))),
        }
    }

    pub fn create_local(&self, name: &str, ctx: &PluginContext) -> Result<Box<dyn LocalPlanner>> {
        match self.local.get(name) {
            Some(factory) => factory(ctx),
            None => Err(SarathiError::Plugin(format!(
                "no local planner registered under the name {:?}",
                name
            ))),
        }
    }

    pub fn create_recovery(
        &self,
        kind: &str,
        ctx: &PluginContext,
    ) -> Result<Box<dyn RecoveryBehavior>> {
        match self.recovery.get(kind) {
            Some(factory) => factory(ctx),
            None => Err(SarathiError::Plugin(format!(
                "no recovery behavior registered under the name {:?}",
                kind
            ))),
        }
    }

    pub fn has_recovery(&self, kind: &str) -> bool {
        self.recovery.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costmap::Costmap;
    use crate::topics::NavTopics;
    use crate::transform::StaticTransforms;
    use crate::types::{Plan, PoseStamped};
    use std::sync::Arc;

    struct NullPlanner;

    impl GlobalPlanner for NullPlanner {
        fn make_plan(&mut self, _start: &PoseStamped, _goal: &PoseStamped) -> Option<Plan> {
            None
        }
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

    #[test]
    fn test_create_registered_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register_global("null", |_| Ok(Box::new(NullPlanner)));
        assert!(registry.create_global("null", &context()).is_ok());
    }

    #[test]
    fn test_unknown_name_is_plugin_error() {
        let registry = PluginRegistry::new();
        match registry.create_global("missing", &context()) {
            Err(err) => assert!(matches!(err, SarathiError::Plugin(_))),
            Ok(_) => panic!("expected an error"),
        }
    }
}
