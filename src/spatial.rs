use std::collections::HashMap;

use glam::Vec2;

use crate::{require_positive, ConfigError, ObstacleSegment};

/// What kind of entity an element of a spatial index refers to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SpatialKind {
  Agent,
  Obstacle,
}

/// Collects the results of a neighbourhood query, split by kind. The indices
/// refer to whatever storage the index was built from.
#[derive(Default, Clone, Debug)]
pub struct NeighbourhoodCollector {
  pub neighbours: Vec<usize>,
  pub obstacles: Vec<usize>,
}

impl NeighbourhoodCollector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn clear(&mut self) {
    self.neighbours.clear();
    self.obstacles.clear();
  }

  pub fn visit(&mut self, kind: SpatialKind, index: usize) {
    match kind {
      SpatialKind::Agent => self.neighbours.push(index),
      SpatialKind::Obstacle => self.obstacles.push(index),
    }
  }

  /// Sorts both lists and removes repeated indices.
  pub fn sort_and_dedup(&mut self) {
    self.neighbours.sort_unstable();
    self.neighbours.dedup();
    self.obstacles.sort_unstable();
    self.obstacles.dedup();
  }
}

/// A broad-phase lookup of agents and obstacles near a point.
pub trait NeighbourhoodQuery {
  /// Adds every agent and obstacle that may lie within the box centered at
  /// `position` with half-size `extent` to `collector`. Returning elements
  /// outside the box is fine; missing elements inside the box is not.
  fn query(
    &self,
    position: Vec2,
    extent: Vec2,
    collector: &mut NeighbourhoodCollector,
  );
}

/// The cell size used when none is given.
pub const DEFAULT_CELL_SIZE: f32 = 5.0;

/// A uniform grid spatial hash. Agents move every step, so they live in their
/// own layer that is rebuilt from scratch. Obstacles never move and are
/// inserted once, into the cells their (thickened) segment passes through.
#[derive(Clone, Debug)]
pub struct UniformGrid {
  cell_size: f32,
  agent_cells: HashMap<(i32, i32), Vec<usize>>,
  obstacle_cells: HashMap<(i32, i32), Vec<usize>>,
}

impl Default for UniformGrid {
  fn default() -> Self {
    Self {
      cell_size: DEFAULT_CELL_SIZE,
      agent_cells: HashMap::new(),
      obstacle_cells: HashMap::new(),
    }
  }
}

impl UniformGrid {
  pub fn new(cell_size: f32) -> Result<Self, ConfigError> {
    require_positive("cell_size", cell_size)?;
    Ok(Self { cell_size, ..Self::default() })
  }

  pub fn cell_size(&self) -> f32 {
    self.cell_size
  }

  /// The number of cells currently holding at least one agent.
  pub fn agent_cell_count(&self) -> usize {
    self.agent_cells.len()
  }

  /// The number of cells touched by any obstacle.
  pub fn obstacle_cell_count(&self) -> usize {
    self.obstacle_cells.len()
  }

  /// Removes every agent. Cells are dropped too, so the agent layer only ever
  /// holds the cells occupied since the last call.
  pub fn clear_agents(&mut self) {
    self.agent_cells.clear();
  }

  /// Removes every agent and obstacle.
  pub fn clear(&mut self) {
    self.agent_cells.clear();
    self.obstacle_cells.clear();
  }

  pub fn insert_agent(&mut self, index: usize, position: Vec2) {
    let coords = self.cell_coords(position);
    self.agent_cells.entry(coords).or_default().push(index);
  }

  /// Inserts `segment` into every cell within its thickness. The segment is
  /// walked one column at a time, so the number of cells grows with its
  /// length rather than with the area of its bounds.
  pub fn insert_obstacle(&mut self, index: usize, segment: &ObstacleSegment) {
    // Widen each column slightly so rounding in `cell_coords` cannot drop a
    // cell the segment actually touches.
    let margin = segment.thickness + self.cell_size * 1e-3;
    let start = segment.p1.point;
    let edge = segment.p2.point - start;

    let (min, max) = segment.aabb();
    let (min_column, _) = self.cell_coords(min);
    let (max_column, _) = self.cell_coords(max);

    for column in min_column..=max_column {
      let column_min = column as f32 * self.cell_size - margin;
      let column_max = (column + 1) as f32 * self.cell_size + margin;

      // The part of the segment within `margin` of the column, as a range of
      // the segment's parameter.
      let (t_min, t_max) = if edge.x == 0.0 {
        (0.0, 1.0)
      } else {
        let t_a = (column_min - start.x) / edge.x;
        let t_b = (column_max - start.x) / edge.x;
        (t_a.min(t_b).max(0.0), t_a.max(t_b).min(1.0))
      };
      if t_min > t_max {
        continue;
      }

      let y_a = start.y + t_min * edge.y;
      let y_b = start.y + t_max * edge.y;
      let min_row = self.cell_row(y_a.min(y_b) - margin);
      let max_row = self.cell_row(y_a.max(y_b) + margin);
      for row in min_row..=max_row {
        self.obstacle_cells.entry((column, row)).or_default().push(index);
      }
    }
  }

  fn cell_coords(&self, position: Vec2) -> (i32, i32) {
    let cell = (position / self.cell_size).floor();
    (cell.x as i32, cell.y as i32)
  }

  fn cell_row(&self, y: f32) -> i32 {
    (y / self.cell_size).floor() as i32
  }
}

impl NeighbourhoodQuery for UniformGrid {
  fn query(
    &self,
    position: Vec2,
    extent: Vec2,
    collector: &mut NeighbourhoodCollector,
  ) {
    let min = self.cell_coords(position - extent);
    let max = self.cell_coords(position + extent);
    for x in min.0..=max.0 {
      for y in min.1..=max.1 {
        if let Some(agents) = self.agent_cells.get(&(x, y)) {
          for &index in agents {
            collector.visit(SpatialKind::Agent, index);
          }
        }
        if let Some(obstacles) = self.obstacle_cells.get(&(x, y)) {
          for &index in obstacles {
            collector.visit(SpatialKind::Obstacle, index);
          }
        }
      }
    }
    // Obstacles spanning several cells are visited more than once.
    collector.sort_and_dedup();
  }
}

#[cfg(test)]
#[path = "spatial_test.rs"]
mod test;
