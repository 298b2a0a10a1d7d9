//! 2-D cost grid shared between the coordinator and its planners.
//!
//! Two layers: a static layer seeded at construction (or by map loads) and
//! the working layer the planners read. Sensor pipelines mark obstacles in
//! the working layer; the coordinator clears windows in it and can reset
//! it wholesale back to the static layer.

use parking_lot::Mutex;
use std::sync::Arc;

/// Cost thresholds for planning
pub mod cost {
    /// Safe to traverse, no penalty
    pub const FREE: u8 = 0;
    /// Close to an obstacle, penalized but traversable
    pub const NEAR_OBSTACLE: u8 = 50;
    /// Within the robot footprint, blocked
    pub const INSCRIBED: u8 = 254;
    /// Obstacle, blocked
    pub const LETHAL: u8 = 255;
}

/// A bounded cost grid in a fixed global frame.
#[derive(Clone, Debug)]
pub struct Costmap {
    name: String,
    global_frame: String,
    width: usize,
    height: usize,
    /// Meters per cell
    resolution: f32,
    origin_x: f32,
    origin_y: f32,
    cells: Vec<u8>,
    static_cells: Vec<u8>,
    /// Sensor freshness; when false the base must not be commanded
    current: bool,
    active: bool,
}

/// Shared handle; the coordinator takes the lock only to read for planning
/// or to write a clear window.
pub type SharedCostmap = Arc<Mutex<Costmap>>;

impl Costmap {
    pub fn new(
        name: &str,
        global_frame: &str,
        width: usize,
        height: usize,
        resolution: f32,
        origin_x: f32,
        origin_y: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            global_frame: global_frame.to_string(),
            width,
            height,
            resolution,
            origin_x,
            origin_y,
            cells: vec![cost::FREE; width * height],
            static_cells: vec![cost::FREE; width * height],
            current: true,
            active: true,
        }
    }

    /// Wrap into the shared handle used across threads.
    pub fn into_shared(self) -> SharedCostmap {
        Arc::new(Mutex::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global_frame(&self) -> &str {
        &self.global_frame
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Whether the sensor pipeline behind this map is fresh.
    pub fn is_current(&self) -> bool {
        self.current
    }

    pub fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    /// Resume updating (no-op placeholder state for sensor pipelines).
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stop updating while no goal is active.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Cost at a grid cell; out-of-bounds reads are lethal.
    #[inline]
    pub fn cost(&self, x: i32, y: i32) -> u8 {
        match self.index(x, y) {
            Some(idx) => self.cells[idx],
            None => cost::LETHAL,
        }
    }

    /// Write the working layer only.
    pub fn set_cost(&mut self, x: i32, y: i32, value: u8) {
        if let Some(idx) = self.index(x, y) {
            self.cells[idx] = value;
        }
    }

    /// Write both layers; used when seeding the map.
    pub fn set_static_cost(&mut self, x: i32, y: i32, value: u8) {
        if let Some(idx) = self.index(x, y) {
            self.cells[idx] = value;
            self.static_cells[idx] = value;
        }
    }

    /// Mark a world-frame axis-aligned rectangle as lethal in both layers.
    pub fn add_static_obstacle(&mut self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) {
        let (gx0, gy0) = self.world_to_grid(min_x, min_y);
        let (gx1, gy1) = self.world_to_grid(max_x, max_y);
        for y in gy0..=gy1 {
            for x in gx0..=gx1 {
                self.set_static_cost(x, y, cost::LETHAL);
            }
        }
    }

    /// Drop every layer back to the static map.
    pub fn reset_layers(&mut self) {
        self.cells.copy_from_slice(&self.static_cells);
        self.current = true;
        tracing::debug!("{}: layers reset", self.name);
    }

    /// Set every cell whose center lies inside the convex polygon to
    /// `value`. Vertices are world coordinates in winding order.
    pub fn set_convex_polygon_cost(&mut self, polygon: &[(f32, f32)], value: u8) {
        if polygon.len() < 3 {
            return;
        }

        let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        let (gx0, gy0) = self.world_to_grid(min_x, min_y);
        let (gx1, gy1) = self.world_to_grid(max_x, max_y);

        for gy in gy0..=gy1 {
            for gx in gx0..=gx1 {
                let (wx, wy) = self.grid_to_world(gx, gy);
                if Self::inside_convex(polygon, wx, wy) {
                    self.set_cost(gx, gy, value);
                }
            }
        }
    }

    /// Restore cells farther than `distance` from (wx, wy) to the static
    /// layer. This is the clearing primitive used by recovery: obstacles
    /// near the robot are trusted, remote ones are assumed stale.
    pub fn clear_beyond(&mut self, wx: f32, wy: f32, distance: f32) {
        for gy in 0..self.height as i32 {
            for gx in 0..self.width as i32 {
                let (cx, cy) = self.grid_to_world(gx, gy);
                if (cx - wx).hypot(cy - wy) > distance {
                    let idx = (gy as usize) * self.width + gx as usize;
                    self.cells[idx] = self.static_cells[idx];
                }
            }
        }
    }

    /// Convert world coordinates to grid coordinates.
    #[inline]
    pub fn world_to_grid(&self, wx: f32, wy: f32) -> (i32, i32) {
        (
            ((wx - self.origin_x) / self.resolution).floor() as i32,
            ((wy - self.origin_y) / self.resolution).floor() as i32,
        )
    }

    /// Convert grid coordinates to world coordinates (cell center).
    #[inline]
    pub fn grid_to_world(&self, gx: i32, gy: i32) -> (f32, f32) {
        (
            self.origin_x + (gx as f32 + 0.5) * self.resolution,
            self.origin_y + (gy as f32 + 0.5) * self.resolution,
        )
    }

    pub fn contains(&self, gx: i32, gy: i32) -> bool {
        self.index(gx, gy).is_some()
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize) * self.width + x as usize)
    }

    fn inside_convex(polygon: &[(f32, f32)], x: f32, y: f32) -> bool {
        let mut sign = 0.0f32;
        for i in 0..polygon.len() {
            let (ax, ay) = polygon[i];
            let (bx, by) = polygon[(i + 1) % polygon.len()];
            let cross = (bx - ax) * (y - ay) - (by - ay) * (x - ax);
            if cross.abs() < f32::EPSILON {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }
}
