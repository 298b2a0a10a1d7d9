//! Default global planner: Dijkstra over the costmap grid.
//!
//! 8-connected search weighted by cell cost, producing a pose path in the
//! costmap's global frame. Deliberately plain; anything smarter belongs in
//! a dedicated planner registered under its own name.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::costmap::{cost, SharedCostmap};
use crate::types::{Plan, PoseStamped, Quaternion};

/// Extra path cost per unit of cell cost, relative to the step length.
/// Keeps the search preferring clearance without making inflated cells
/// impassable.
const COST_WEIGHT: f32 = 2.0 / 255.0;

pub struct GridPlanner {
    costmap: SharedCostmap,
}

impl GridPlanner {
    pub fn new(costmap: SharedCostmap) -> Self {
        Self { costmap }
    }
}

#[derive(PartialEq)]
struct QueueEntry {
    dist: f32,
    idx: usize,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the binary heap pops the cheapest entry first.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl super::GlobalPlanner for GridPlanner {
    fn make_plan(&mut self, start: &PoseStamped, goal: &PoseStamped) -> Option<Plan> {
        let map = self.costmap.lock();

        let (sx, sy) = map.world_to_grid(start.position.x, start.position.y);
        let (gx, gy) = map.world_to_grid(goal.position.x, goal.position.y);

        if !map.contains(sx, sy) || !map.contains(gx, gy) {
            tracing::debug!("Start or goal lies outside the costmap");
            return None;
        }
        if map.cost(gx, gy) >= cost::INSCRIBED {
            tracing::debug!("Goal cell is occupied");
            return None;
        }

        let width = map.width() as i32;
        let height = map.height() as i32;
        let total = (width * height) as usize;
        let start_idx = (sy * width + sx) as usize;
        let goal_idx = (gy * width + gx) as usize;

        let mut dist = vec![f32::INFINITY; total];
        let mut came_from = vec![usize::MAX; total];
        let mut heap = BinaryHeap::new();

        dist[start_idx] = 0.0;
        heap.push(QueueEntry {
            dist: 0.0,
            idx: start_idx,
        });

        let neighbors: [(i32, i32, f32); 8] = [
            (-1, 0, 1.0),
            (1, 0, 1.0),
            (0, -1, 1.0),
            (0, 1, 1.0),
            (-1, -1, std::f32::consts::SQRT_2),
            (1, -1, std::f32::consts::SQRT_2),
            (-1, 1, std::f32::consts::SQRT_2),
            (1, 1, std::f32::consts::SQRT_2),
        ];

        let mut reached = false;
        while let Some(QueueEntry { dist: d, idx }) = heap.pop() {
            if idx == goal_idx {
                reached = true;
                break;
            }
            if d > dist[idx] {
                continue;
            }

            let x = idx as i32 % width;
            let y = idx as i32 / width;

            for &(dx, dy, step) in &neighbors {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }

                let cell_cost = map.cost(nx, ny);
                if cell_cost >= cost::INSCRIBED {
                    continue;
                }

                let next_idx = (ny * width + nx) as usize;
                let next_dist = d + step * (1.0 + COST_WEIGHT * cell_cost as f32);
                if next_dist < dist[next_idx] {
                    dist[next_idx] = next_dist;
                    came_from[next_idx] = idx;
                    heap.push(QueueEntry {
                        dist: next_dist,
                        idx: next_idx,
                    });
                }
            }
        }

        if !reached {
            tracing::debug!(
                "No path from ({:.2}, {:.2}) to ({:.2}, {:.2})",
                start.position.x,
                start.position.y,
                goal.position.x,
                goal.position.y
            );
            return None;
        }

        // Walk the predecessor chain back to the start.
        let mut cells = Vec::new();
        let mut idx = goal_idx;
        while idx != usize::MAX {
            cells.push(idx);
            if idx == start_idx {
                break;
            }
            idx = came_from[idx];
        }
        cells.reverse();

        let frame = map.global_frame().to_string();
        let mut plan: Plan = Vec::with_capacity(cells.len());
        for (i, &idx) in cells.iter().enumerate() {
            let (wx, wy) = map.grid_to_world(idx as i32 % width, idx as i32 / width);
            let mut pose = PoseStamped::new(&frame, wx, wy, 0.0);
            pose.stamp = goal.stamp;
            // Point each pose along the path; the last one takes the goal
            // heading.
            if i + 1 < cells.len() {
                let next = cells[i + 1];
                let (nx, ny) = map.grid_to_world(next as i32 % width, next as i32 / width);
                pose.orientation = Quaternion::from_yaw((ny - wy).atan2(nx - wx));
            } else {
                pose.orientation = goal.orientation;
                pose.position.x = goal.position.x;
                pose.position.y = goal.position.y;
            }
            plan.push(pose);
        }

        tracing::debug!("Planned a {}-pose path", plan.len());
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costmap::Costmap;
    use crate::plugins::GlobalPlanner;

    fn open_map() -> SharedCostmap {
        Costmap::new("global_costmap", "map", 40, 40, 0.05, -1.0, -1.0).into_shared()
    }

    #[test]
    fn test_straight_line_plan() {
        let mut planner = GridPlanner::new(open_map());
        let start = PoseStamped::new("map", 0.0, 0.0, 0.0);
        let goal = PoseStamped::new("map", 0.8, 0.0, 0.0);

        let plan = planner.make_plan(&start, &goal).unwrap();
        assert!(plan.len() >= 2);
        let last = plan.last().unwrap();
        assert_eq!(last.position.x, 0.8);
        assert_eq!(last.position.y, 0.0);
    }

    #[test]
    fn test_plan_routes_around_wall() {
        let map = open_map();
        map.lock().add_static_obstacle(0.3, -1.0, 0.4, 0.7);
        let mut planner = GridPlanner::new(map.clone());

        let start = PoseStamped::new("map", 0.0, 0.0, 0.0);
        let goal = PoseStamped::new("map", 0.8, 0.0, 0.0);
        let plan = planner.make_plan(&start, &goal).unwrap();

        // The wall spans y in [-1.0, 0.7]; the detour must pass above it.
        let max_y = plan.iter().map(|p| p.position.y).fold(f32::MIN, f32::max);
        assert!(max_y > 0.7);
        for pose in &plan {
            let m = map.lock();
            let (gx, gy) = m.world_to_grid(pose.position.x, pose.position.y);
            assert!(m.cost(gx, gy) < crate::costmap::cost::INSCRIBED);
        }
    }

    #[test]
    fn test_unreachable_goal_is_none() {
        let map = open_map();
        // Box the goal in completely.
        map.lock().add_static_obstacle(0.5, -0.3, 1.0, -0.25);
        map.lock().add_static_obstacle(0.5, 0.25, 1.0, 0.3);
        map.lock().add_static_obstacle(0.5, -0.3, 0.55, 0.3);
        map.lock().add_static_obstacle(0.95, -0.3, 1.0, 0.3);
        let mut planner = GridPlanner::new(map);

        let start = PoseStamped::new("map", 0.0, 0.0, 0.0);
        let goal = PoseStamped::new("map", 0.75, 0.0, 0.0);
        assert!(planner.make_plan(&start, &goal).is_none());
    }

    #[test]
    fn test_goal_outside_map_is_none() {
        let mut planner = GridPlanner::new(open_map());
        let start = PoseStamped::new("map", 0.0, 0.0, 0.0);
        let goal = PoseStamped::new("map", 50.0, 0.0, 0.0);
        assert!(planner.make_plan(&start, &goal).is_none());
    }
}
