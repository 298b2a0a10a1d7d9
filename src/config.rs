//! Configuration loading for SarathiNav

use crate::error::{Result, SarathiError};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Deserialize)]
pub struct SarathiConfig {
    #[serde(default)]
    pub frames: FrameConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub oscillation: OscillationConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub costmap: CostmapConfig,
    #[serde(default)]
    pub make_plan: MakePlanConfig,
}

/// Coordinate frame names
#[derive(Clone, Debug, Deserialize)]
pub struct FrameConfig {
    /// Frame rigidly attached to the robot body (default: base_link)
    #[serde(default = "default_robot_base_frame")]
    pub robot_base_frame: String,
}

/// Global planning settings
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerConfig {
    /// Registered name of the global planner (default: grid_planner)
    #[serde(default = "default_global_planner")]
    pub base_global_planner: String,

    /// Replanning cadence in Hz; 0 plans once per goal (default: 0.0)
    #[serde(default)]
    pub planner_frequency: f32,

    /// Seconds without a valid plan before escalating (default: 5.0)
    #[serde(default = "default_planner_patience")]
    pub planner_patience: f32,

    /// Failed attempts before escalating; negative disables (default: -1)
    #[serde(default = "default_max_planning_retries")]
    pub max_planning_retries: i32,
}

/// Local control settings
#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    /// Registered name of the local planner (default: pursuit_controller)
    #[serde(default = "default_local_planner")]
    pub base_local_planner: String,

    /// Control loop tick rate in Hz (default: 20.0)
    #[serde(default = "default_controller_frequency")]
    pub controller_frequency: f32,

    /// Seconds without a valid velocity before escalating (default: 15.0)
    #[serde(default = "default_controller_patience")]
    pub controller_patience: f32,
}

/// Oscillation detection settings
#[derive(Clone, Debug, Deserialize)]
pub struct OscillationConfig {
    /// Seconds without progress before escalating; 0 disables (default: 0.0)
    #[serde(default)]
    pub timeout: f32,

    /// Displacement that counts as progress, meters (default: 0.5)
    #[serde(default = "default_oscillation_distance")]
    pub distance: f32,
}

/// Recovery ladder settings
#[derive(Clone, Debug, Deserialize)]
pub struct RecoveryConfig {
    /// Master switch for the recovery ladder (default: true)
    #[serde(default = "default_true")]
    pub recovery_behavior_enabled: bool,

    /// Allow in-place rotation recoveries (default: true)
    #[serde(default = "default_true")]
    pub clearing_rotation_allowed: bool,

    /// Reset distance for the conservative costmap clear, meters
    /// (default: 3.0)
    #[serde(default = "default_conservative_reset_dist")]
    pub conservative_reset_dist: f32,

    /// Half-size of the window cleared around the robot before
    /// plan-on-demand, meters (default: circumscribed radius)
    #[serde(default = "default_circumscribed_radius")]
    pub clearing_radius: f32,

    /// Ordered ladder; empty selects the built-in default ladder
    #[serde(default)]
    pub behaviors: Vec<RecoveryBehaviorSpec>,
}

/// One entry of a user-configured recovery ladder
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RecoveryBehaviorSpec {
    pub name: String,
    /// Registered behavior type
    #[serde(rename = "type")]
    pub kind: String,
}

/// Costmap-related coordinator settings
#[derive(Clone, Debug, Deserialize)]
pub struct CostmapConfig {
    /// Radius of the largest circle inside the footprint, meters
    /// (default: 0.325)
    #[serde(default = "default_inscribed_radius")]
    pub inscribed_radius: f32,

    /// Radius of the smallest circle containing the footprint, meters
    /// (default: 0.46)
    #[serde(default = "default_circumscribed_radius")]
    pub circumscribed_radius: f32,

    /// Stop costmaps while no goal is active (default: false)
    #[serde(default)]
    pub shutdown_costmaps: bool,
}

/// Plan-on-demand service settings
#[derive(Clone, Debug, Deserialize)]
pub struct MakePlanConfig {
    /// Clear a window around the robot before planning (default: true)
    #[serde(default = "default_true")]
    pub clear_costmap: bool,

    /// Append the unreachable original goal to offset-search results
    /// (default: true)
    #[serde(default = "default_true")]
    pub add_unreachable_goal: bool,
}

// Default value functions
fn default_robot_base_frame() -> String {
    "base_link".to_string()
}
fn default_global_planner() -> String {
    "grid_planner".to_string()
}
fn default_local_planner() -> String {
    "pursuit_controller".to_string()
}
fn default_planner_patience() -> f32 {
    5.0
}
fn default_max_planning_retries() -> i32 {
    -1
}
fn default_controller_frequency() -> f32 {
    20.0
}
fn default_controller_patience() -> f32 {
    15.0
}
fn default_oscillation_distance() -> f32 {
    0.5
}
fn default_conservative_reset_dist() -> f32 {
    3.0
}
fn default_inscribed_radius() -> f32 {
    0.325
}
fn default_circumscribed_radius() -> f32 {
    0.46
}
fn default_true() -> bool {
    true
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            robot_base_frame: default_robot_base_frame(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_global_planner: default_global_planner(),
            planner_frequency: 0.0,
            planner_patience: default_planner_patience(),
            max_planning_retries: default_max_planning_retries(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_local_planner: default_local_planner(),
            controller_frequency: default_controller_frequency(),
            controller_patience: default_controller_patience(),
        }
    }
}

impl Default for OscillationConfig {
    fn default() -> Self {
        Self {
            timeout: 0.0,
            distance: default_oscillation_distance(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            recovery_behavior_enabled: true,
            clearing_rotation_allowed: true,
            conservative_reset_dist: default_conservative_reset_dist(),
            clearing_radius: default_circumscribed_radius(),
            behaviors: Vec::new(),
        }
    }
}

impl Default for CostmapConfig {
    fn default() -> Self {
        Self {
            inscribed_radius: default_inscribed_radius(),
            circumscribed_radius: default_circumscribed_radius(),
            shutdown_costmaps: false,
        }
    }
}

impl Default for MakePlanConfig {
    fn default() -> Self {
        Self {
            clear_costmap: true,
            add_unreachable_goal: true,
        }
    }
}

impl Default for SarathiConfig {
    fn default() -> Self {
        Self {
            frames: FrameConfig::default(),
            planner: PlannerConfig::default(),
            controller: ControllerConfig::default(),
            oscillation: OscillationConfig::default(),
            recovery: RecoveryConfig::default(),
            costmap: CostmapConfig::default(),
            make_plan: MakePlanConfig::default(),
        }
    }
}

impl SarathiConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SarathiError::Config(format!("Failed to read config file: {}", e)))?;
        let config: SarathiConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SarathiConfig::default();
        assert_eq!(config.planner.base_global_planner, "grid_planner");
        assert_eq!(config.controller.controller_frequency, 20.0);
        assert_eq!(config.planner.max_planning_retries, -1);
        assert!(config.recovery.behaviors.is_empty());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: SarathiConfig = toml::from_str(
            r#"
            [planner]
            planner_frequency = 2.0
            planner_patience = 1.5

            [[recovery.behaviors]]
            name = "soft_clear"
            type = "clear_costmap"
            "#,
        )
        .unwrap();

        assert_eq!(config.planner.planner_frequency, 2.0);
        assert_eq!(config.planner.planner_patience, 1.5);
        // Untouched sections keep their defaults.
        assert_eq!(config.controller.controller_patience, 15.0);
        assert_eq!(config.recovery.behaviors.len(), 1);
        assert_eq!(config.recovery.behaviors[0].kind, "clear_costmap");
    }
}
