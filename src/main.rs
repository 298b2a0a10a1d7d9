//! SarathiNav - navigation coordinator daemon.
//!
//! Stands up the coordinator against an in-process world: static costmaps
//! with a wall to route around, a transform table fed by a small unicycle
//! integrator that consumes the published velocity commands, and the
//! built-in planner, controller, and recovery plugins. Drives one goal to
//! completion and exits.
//!
//! ## Usage
//!
//! ```bash
//! # With default configuration and the default goal
//! cargo run
//!
//! # With a config file and an explicit goal (x y yaw)
//! cargo run -- sarathi.toml --goal 2.0 0.0 0.0
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use sarathi_nav::utils::normalize_angle;
use sarathi_nav::{
    Coordinator, Costmap, PluginRegistry, PoseStamped, Result, SarathiConfig, StaticTransforms,
    Transform2D, Twist,
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sarathi_nav=info".parse().unwrap()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let config = if args.len() > 1 && !args[1].starts_with("--") {
        let config_path = Path::new(&args[1]);
        info!("Loading configuration from {:?}", config_path);
        SarathiConfig::load(config_path)?
    } else if Path::new("sarathi.toml").exists() {
        info!("Loading configuration from sarathi.toml");
        SarathiConfig::load(Path::new("sarathi.toml"))?
    } else {
        info!("Using default configuration");
        SarathiConfig::default()
    };

    let goal = parse_goal(&args).unwrap_or((2.0, 0.0, 0.0));

    info!("SarathiNav v{}", env!("CARGO_PKG_VERSION"));

    // A 12m x 12m world at 5cm resolution with one wall to route around.
    let planner_costmap =
        Costmap::new("global_costmap", "map", 240, 240, 0.05, -6.0, -6.0).into_shared();
    let controller_costmap =
        Costmap::new("local_costmap", "map", 240, 240, 0.05, -6.0, -6.0).into_shared();
    for costmap in [&planner_costmap, &controller_costmap] {
        costmap.lock().add_static_obstacle(0.9, -4.0, 1.1, 0.6);
    }

    let tf = Arc::new(StaticTransforms::new());
    tf.set("base_link", "map", Transform2D::new(0.0, 0.0, 0.0));

    let registry = PluginRegistry::with_defaults(&config);
    let coordinator = Arc::new(Coordinator::new(
        config,
        registry,
        planner_costmap,
        controller_costmap,
        tf.clone(),
    )?);

    // Integrate velocity commands into the transform table so the
    // coordinator sees its own commands move the robot.
    let sim_running = Arc::new(AtomicBool::new(true));
    let sim_thread = {
        let tf = Arc::clone(&tf);
        let commands = coordinator.topics().cmd_vel.subscribe();
        let running = Arc::clone(&sim_running);
        thread::Builder::new()
            .name("base-sim".into())
            .spawn(move || {
                let dt = 0.01f32;
                let (mut x, mut y, mut yaw) = (0.0f32, 0.0f32, 0.0f32);
                let mut twist = Twist::ZERO;
                while running.load(Ordering::Relaxed) {
                    for cmd in commands.try_iter() {
                        twist = cmd;
                    }
                    yaw = normalize_angle(yaw + twist.angular_z * dt);
                    x += (twist.linear_x * yaw.cos() - twist.linear_y * yaw.sin()) * dt;
                    y += (twist.linear_x * yaw.sin() + twist.linear_y * yaw.cos()) * dt;
                    tf.set("base_link", "map", Transform2D::new(x, y, yaw));
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .expect("Failed to spawn base simulator thread")
    };

    // Service goals on a dedicated thread, exactly as an external action
    // client would see it.
    let control_thread = {
        let coordinator = Arc::clone(&coordinator);
        thread::Builder::new()
            .name("control".into())
            .spawn(move || coordinator.run())
            .expect("Failed to spawn control thread")
    };

    let results = coordinator.action_server().result.subscribe();
    info!("Navigating to ({:.2}, {:.2}, {:.1}rad)", goal.0, goal.1, goal.2);
    coordinator
        .action_server()
        .send_goal(PoseStamped::new("map", goal.0, goal.1, goal.2));

    match results.recv() {
        Ok(result) => info!("Navigation finished: {:?}", result),
        Err(_) => error!("Result channel closed before the goal finished"),
    }

    // Shut everything down and wait for the threads.
    coordinator.request_shutdown();
    sim_running.store(false, Ordering::Relaxed);

    if control_thread.join().is_err() {
        error!("Control thread panicked");
    }
    if sim_thread.join().is_err() {
        error!("Simulator thread panicked");
    }

    info!("SarathiNav finished");
    Ok(())
}

/// Pull "--goal x y yaw" out of the argument list.
fn parse_goal(args: &[String]) -> Option<(f32, f32, f32)> {
    let at = args.iter().position(|a| a == "--goal")?;
    let x = args.get(at + 1)?.parse().ok()?;
    let y = args.get(at + 2)?.parse().ok()?;
    let yaw = args.get(at + 3)?.parse().ok()?;
    Some((x, y, yaw))
}
