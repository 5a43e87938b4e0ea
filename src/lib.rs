// The contents of this file were primarily ported from Agent.cc from RVO2 with
// significant alterations. As per the Apache-2.0 license, the original
// copyright notice has been included, excluding those notices that do not
// pertain to the derivate work:
//
// Agent.cc
// RVO2 Library
//
// SPDX-FileCopyrightText: 2008 University of North Carolina at Chapel Hill
//
// The authors may be contacted via:
//
// Jur van den Berg, Stephen J. Guy, Jamie Snape, Ming C. Lin, Dinesh Manocha
// Dept. of Computer Science
// 201 S. Columbia St.
// Frederick P. Brooks, Jr. Computer Science Bldg.
// Chapel Hill, N.C. 27599-3175
// United States of America
//
// <https://gamma.cs.unc.edu/RVO2/>

mod common;
mod linear_programming;
mod obstacles;
mod scratch;
mod simulator;
mod spatial;

use log::warn;
use thiserror::Error;

use crate::common::{determinant, left_leg, right_leg, RVO_EPSILON};
use crate::linear_programming::solve_linear_program;
use crate::obstacles::get_lines_for_agent_to_segments;

pub use glam::Vec2;
pub use linear_programming::Line;
pub use obstacles::{Obstacle, ObstacleError, ObstacleSegment, SegmentVertex};
pub use scratch::{
  ConstraintBuffers, PooledScratch, ScratchBuffers, ScratchPool,
};
pub use simulator::{AgentParameters, Simulator};
pub use spatial::{
  NeighbourhoodCollector, NeighbourhoodQuery, SpatialKind, UniformGrid,
  DEFAULT_CELL_SIZE,
};

/// Committed velocities are clamped to this range per component.
pub const VELOCITY_COMPONENT_LIMIT: f32 = 100.0;

/// A single agent in the simulation.
#[derive(Clone, PartialEq, Debug)]
pub struct Agent {
  /// The position of the agent.
  pub position: Vec2,
  /// The current velocity of the agent. This is the velocity committed on the
  /// previous tick.
  pub velocity: Vec2,

  /// The radius of the agent. Agents will use this to avoid bumping into each
  /// other and into obstacles.
  pub radius: f32,
  /// The maximum magnitude of any velocity computed for this agent.
  pub max_speed: f32,
  /// Agents without avoidance keep whatever velocity they were given. Other
  /// agents still avoid them.
  pub avoidance_enabled: bool,
}

/// Parameters for computing the avoidance velocity.
#[derive(Clone, PartialEq, Debug)]
pub struct AvoidanceOptions {
  /// How long in the future should collisions be considered between agents.
  pub time_horizon: f32,
  /// How long in the future should collisions be considered for obstacles.
  pub obstacle_time_horizon: f32,
  /// The length of a simulation tick. This determines the velocity used to
  /// escape existing collisions.
  pub time_step: f32,
  /// Half-size of the box queried for neighbours and obstacles.
  pub neighbour_query_extent: Vec2,
}

impl Default for AvoidanceOptions {
  fn default() -> Self {
    Self {
      time_horizon: 2.0,
      obstacle_time_horizon: 2.0,
      time_step: 0.1,
      neighbour_query_extent: Vec2::splat(5.0),
    }
  }
}

/// Invalid agent or avoidance configuration.
#[derive(Error, Clone, PartialEq, Debug)]
pub enum ConfigError {
  #[error("{field} must be positive and finite, but was {value}")]
  NonPositive { field: &'static str, value: f32 },
}

pub(crate) fn require_positive(
  field: &'static str,
  value: f32,
) -> Result<(), ConfigError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(ConfigError::NonPositive { field, value })
  }
}

impl AvoidanceOptions {
  pub fn validate(&self) -> Result<(), ConfigError> {
    require_positive("time_horizon", self.time_horizon)?;
    require_positive("obstacle_time_horizon", self.obstacle_time_horizon)?;
    require_positive("time_step", self.time_step)?;
    let extent = self.neighbour_query_extent;
    require_positive("neighbour_query_extent.x", extent.x)?;
    require_positive("neighbour_query_extent.y", extent.y)
  }
}

impl Agent {
  pub fn validate(&self) -> Result<(), ConfigError> {
    require_positive("radius", self.radius)?;
    require_positive("max_speed", self.max_speed)
  }

  /// The smallest query extent that still finds everything this agent can
  /// interact with within `time_horizon`, given the thickest obstacle.
  pub fn recommended_query_extent(
    &self,
    time_horizon: f32,
    max_obstacle_thickness: f32,
  ) -> Vec2 {
    Vec2::splat(
      (self.max_speed * time_horizon)
        .max(self.radius + max_obstacle_thickness),
    )
  }

  /// Computes a velocity based off the agent's preferred velocity (usually the
  /// direction to its current goal/waypoint). This new velocity is intended to
  /// avoid running into the agent's `neighbours` and `obstacles`. This is not
  /// always possible, but agents will attempt to resolve any collisions in a
  /// reasonable fashion. The result is at most `max_speed` long. Agents with
  /// avoidance disabled just return their current velocity.
  pub fn compute_avoiding_velocity(
    &self,
    neighbours: &[&Agent],
    obstacles: &[&ObstacleSegment],
    preferred_velocity: Vec2,
    avoidance_options: &AvoidanceOptions,
  ) -> Vec2 {
    self.compute_avoiding_velocity_with_buffers(
      neighbours.iter().copied(),
      obstacles.iter().copied(),
      preferred_velocity,
      avoidance_options,
      &mut ConstraintBuffers::default(),
    )
  }

  /// Same as [`Agent::compute_avoiding_velocity`], but builds the constraints
  /// in `buffers` instead of allocating. `neighbours` must not include the
  /// agent itself.
  pub fn compute_avoiding_velocity_with_buffers<'a>(
    &self,
    neighbours: impl IntoIterator<Item = &'a Agent>,
    obstacles: impl IntoIterator<Item = &'a ObstacleSegment>,
    preferred_velocity: Vec2,
    avoidance_options: &AvoidanceOptions,
    buffers: &mut ConstraintBuffers,
  ) -> Vec2 {
    if !self.avoidance_enabled {
      return self.velocity;
    }

    debug_assert!(
      avoidance_options.validate().is_ok(),
      "invalid avoidance options: {:?}",
      avoidance_options
    );

    buffers.lines.clear();

    get_lines_for_agent_to_segments(
      self,
      obstacles,
      avoidance_options.obstacle_time_horizon,
      &mut buffers.obstacles,
      &mut buffers.lines,
    );
    let obstacle_line_count = buffers.lines.len();

    buffers.lines.extend(neighbours.into_iter().filter_map(|neighbour| {
      self.get_line_for_neighbour(
        neighbour,
        avoidance_options.time_horizon,
        avoidance_options.time_step,
      )
    }));
    // The relaxed program depends on the order of the agent lines, so give
    // them an order that does not depend on the order of `neighbours`.
    buffers.lines[obstacle_line_count..].sort_by(|a, b| {
      a.point
        .x
        .total_cmp(&b.point.x)
        .then_with(|| a.point.y.total_cmp(&b.point.y))
        .then_with(|| a.direction.x.total_cmp(&b.direction.x))
        .then_with(|| a.direction.y.total_cmp(&b.direction.y))
    });

    solve_linear_program(
      &buffers.lines,
      obstacle_line_count,
      self.max_speed,
      preferred_velocity,
      &mut buffers.projected_lines,
    )
  }

  /// Creates a line to describe the half-plane of valid velocities that should
  /// not collide with `neighbour`. Returns None if the agents are exactly on
  /// top of each other with no relative motion, since no direction is
  /// better than another.
  fn get_line_for_neighbour(
    &self,
    neighbour: &Agent,
    time_horizon: f32,
    time_step: f32,
  ) -> Option<Line> {
    // The velocity obstacle induced by `neighbour` is the cut-off circle (the
    // relative velocities that collide with `neighbour` within the time
    // horizon) plus the shadow it casts away from the origin. Its two legs are
    // the tangents from the origin to the cut-off circle.

    let relative_position = neighbour.position - self.position;
    let relative_velocity = self.velocity - neighbour.velocity;
    let distance_squared = relative_position.length_squared();
    let combined_radius = self.radius + neighbour.radius;
    let combined_radius_squared = combined_radius * combined_radius;

    let direction;
    // The smallest change to `relative_velocity` that moves it onto the
    // boundary of the velocity obstacle.
    let u;

    if distance_squared > combined_radius_squared {
      // No collision yet. `w` goes from the cut-off circle's center to the
      // relative velocity.
      let inverse_time_horizon = 1.0 / time_horizon;
      let w = relative_velocity - inverse_time_horizon * relative_position;
      let w_length_squared = w.length_squared();
      let dot = w.dot(relative_position);

      if dot < 0.0 && dot * dot > combined_radius_squared * w_length_squared {
        // The relative velocity is in front of the tangent points, so project
        // onto the cut-off circle.
        let w_length = w_length_squared.sqrt();
        let unit_w = w / w_length;

        direction = -unit_w.perp();
        u = (combined_radius * inverse_time_horizon - w_length) * unit_w;
      } else {
        // Project onto whichever leg the relative velocity is nearer to.
        direction = if determinant(relative_position, w) > 0.0 {
          left_leg(relative_position, combined_radius)
        } else {
          -right_leg(relative_position, combined_radius)
        };

        u = relative_velocity.dot(direction) * direction - relative_velocity;
      }
    } else {
      // Already colliding, so get out within a single time step.
      let inverse_time_step = 1.0 / time_step;
      let w = relative_velocity - inverse_time_step * relative_position;
      let w_length = w.length();
      if w_length <= RVO_EPSILON {
        return None;
      }
      let unit_w = w / w_length;

      direction = -unit_w.perp();
      u = (combined_radius * inverse_time_step - w_length) * unit_w;
    }

    // Each agent takes half of the responsibility to avoid the other.
    Some(Line { point: self.velocity + 0.5 * u, direction })
  }
}

/// Guards a solved velocity before it is written back. A non-finite velocity
/// is rejected in favour of `previous`, and every component is clamped to
/// [`VELOCITY_COMPONENT_LIMIT`].
pub fn commit_velocity(previous: Vec2, candidate: Vec2) -> Vec2 {
  let velocity = if candidate.is_finite() {
    candidate
  } else {
    warn!(
      "Rejected non-finite avoidance velocity {}, keeping {}",
      candidate, previous
    );
    previous
  };

  let velocity = if velocity.is_finite() { velocity } else { Vec2::ZERO };
  velocity.clamp(
    Vec2::splat(-VELOCITY_COMPONENT_LIMIT),
    Vec2::splat(VELOCITY_COMPONENT_LIMIT),
  )
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod test;
