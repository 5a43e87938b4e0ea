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

use std::cmp::Ordering;

use glam::{Mat2, Vec2};
use thiserror::Error;

use crate::{
  common::{determinant, left_leg, left_of, right_leg, RVO_EPSILON},
  Agent, Line,
};

/// An authored obstacle, before it is baked into segments.
#[derive(Clone, PartialEq, Debug)]
pub enum Obstacle {
  /// A closed obstacle. The obstacle is closed in that the last vertex will
  /// have an edge connecting it to the first vertex. The edges cannot cross,
  /// and the interior of the obstacle is to the "left" of the edges. In
  /// other words, obstacles with vertices going counter-clockwise will
  /// prevent agents from getting into the loop, and obstacles with vertices
  /// going clockwise will prevent agents from leaving the loop.
  Closed { vertices: Vec<Vec2> },
  /// An open chain of vertices. The chain acts as an infinitely thin wall that
  /// blocks agents from both sides.
  Open { vertices: Vec<Vec2> },
}

/// Errors produced when baking an [`Obstacle`] into segments.
#[derive(Error, Clone, PartialEq, Debug)]
pub enum ObstacleError {
  #[error("obstacle needs at least 2 vertices, but has {count}")]
  TooFewVertices { count: usize },
  #[error("edge {index} of the obstacle has zero length")]
  DegenerateEdge { index: usize },
}

/// One endpoint of an [`ObstacleSegment`].
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SegmentVertex {
  pub point: Vec2,
  /// Whether the interior angle of the obstacle at this vertex is at most 180
  /// degrees.
  pub convex: bool,
  /// Unit vector from this vertex toward the next vertex of the obstacle.
  pub direction: Vec2,
  /// Unit vector from the previous vertex of the obstacle toward this vertex.
  pub prev_inv_direction: Vec2,
  /// 0 for the first endpoint of the segment, 1 for the second.
  pub edge_slot: u8,
}

/// A single directed edge of a baked obstacle. Segments are immutable once
/// baked and carry everything needed to avoid them without looking at the
/// rest of the obstacle.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ObstacleSegment {
  pub p1: SegmentVertex,
  pub p2: SegmentVertex,
  /// Extra distance to keep from the segment, on top of the agent's radius.
  pub thickness: f32,
}

impl ObstacleSegment {
  pub fn midpoint(&self) -> Vec2 {
    (self.p1.point + self.p2.point) * 0.5
  }

  /// The squared distance from `point` to the closest point on the segment.
  pub fn distance_squared_to(&self, point: Vec2) -> f32 {
    let edge_vector = self.p2.point - self.p1.point;
    let t = ((point - self.p1.point).dot(edge_vector)
      / edge_vector.length_squared())
    .clamp(0.0, 1.0);
    point.distance_squared(self.p1.point + t * edge_vector)
  }

  /// The axis-aligned bounds of the segment, inflated by its thickness, as
  /// `(min, max)`.
  pub fn aabb(&self) -> (Vec2, Vec2) {
    let inflate = Vec2::splat(self.thickness);
    (
      self.p1.point.min(self.p2.point) - inflate,
      self.p1.point.max(self.p2.point) + inflate,
    )
  }
}

impl Obstacle {
  /// A closed rectangle centered at `center`, rotated counter-clockwise by
  /// `rotation` radians.
  pub fn rectangle(center: Vec2, half_extents: Vec2, rotation: f32) -> Self {
    let rotation = Mat2::from_angle(rotation);
    let corners = [
      Vec2::new(-half_extents.x, -half_extents.y),
      Vec2::new(half_extents.x, -half_extents.y),
      Vec2::new(half_extents.x, half_extents.y),
      Vec2::new(-half_extents.x, half_extents.y),
    ];
    Self::Closed {
      vertices: corners
        .iter()
        .map(|&corner| center + rotation * corner)
        .collect(),
    }
  }

  /// A straight wall centered at `center` and running along `direction`, made
  /// of `segment_count` thin pieces. Each piece is `segment_length` long plus
  /// `overlap` into the next piece, so agents cannot slip through the seams.
  pub fn wall(
    center: Vec2,
    direction: Vec2,
    segment_count: usize,
    segment_length: f32,
    overlap: f32,
  ) -> Vec<Self> {
    let direction = direction.normalize_or_zero();
    let total_length = segment_count as f32 * segment_length + overlap;
    let start = center - direction * (total_length * 0.5);

    (0..segment_count)
      .map(|index| {
        let piece_start = start + direction * (index as f32 * segment_length);
        Self::Open {
          vertices: vec![
            piece_start,
            piece_start + direction * (segment_length + overlap),
          ],
        }
      })
      .collect()
  }

  /// Bakes the obstacle into directed segments, each with `thickness`. Open
  /// obstacles are traced forward and then back again, so both sides of the
  /// chain are solid.
  pub fn to_segments(
    &self,
    thickness: f32,
  ) -> Result<Vec<ObstacleSegment>, ObstacleError> {
    let outline: Vec<Vec2> = match self {
      Self::Closed { vertices } => vertices.clone(),
      Self::Open { vertices } => vertices
        .iter()
        .chain(
          vertices
            .iter()
            .rev()
            .skip(1)
            .take(vertices.len().saturating_sub(2)),
        )
        .copied()
        .collect(),
    };

    if outline.len() < 2 {
      return Err(ObstacleError::TooFewVertices { count: outline.len() });
    }

    let count = outline.len();
    let vertex = |index: usize| outline[index % count];

    for index in 0..count {
      if vertex(index) == vertex(index + 1) {
        return Err(ObstacleError::DegenerateEdge { index });
      }
    }

    let segment_vertex = |index: usize, edge_slot: u8| {
      let previous = vertex(index + count - 1);
      let current = vertex(index);
      let next = vertex(index + 1);
      SegmentVertex {
        point: current,
        convex: left_of(previous, current, next) >= 0.0,
        direction: (next - current).normalize(),
        prev_inv_direction: (current - previous).normalize(),
        edge_slot,
      }
    };

    Ok(
      (0..count)
        .map(|index| ObstacleSegment {
          p1: segment_vertex(index, 0),
          p2: segment_vertex(index + 1, 1),
          thickness,
        })
        .collect(),
    )
  }
}

/// Appends the lines describing the half-planes of valid velocities for
/// `agent` induced by each of `segments`. `time_horizon` determines how much
/// time in the future collisions with obstacles are considered. Segments are
/// processed nearest first (ties broken by their coordinates), so the result
/// does not depend on the order of `segments`. Segments already covered by a
/// line in `lines` produce no new line, so `lines` should only hold obstacle
/// lines when this is called.
pub(crate) fn get_lines_for_agent_to_segments<'a>(
  agent: &Agent,
  segments: impl IntoIterator<Item = &'a ObstacleSegment>,
  time_horizon: f32,
  sorted_segments: &mut Vec<(f32, ObstacleSegment)>,
  lines: &mut Vec<Line>,
) {
  sorted_segments.clear();
  sorted_segments.extend(segments.into_iter().map(|segment| {
    (segment.distance_squared_to(agent.position), *segment)
  }));
  sorted_segments.sort_by(|(distance_a, a), (distance_b, b)| {
    distance_a
      .total_cmp(distance_b)
      .then_with(|| compare_points(a.p1.point, b.p1.point))
      .then_with(|| compare_points(a.p2.point, b.p2.point))
  });

  for (_, segment) in sorted_segments.iter() {
    if let Some(line) =
      get_line_for_agent_to_segment(agent, segment, time_horizon, lines)
    {
      lines.push(line);
    }
  }
}

fn compare_points(a: Vec2, b: Vec2) -> Ordering {
  a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y))
}

/// Whether both (relative) endpoints of an edge are already deep enough on
/// the invalid side of one of `existing_lines` that the edge cannot be reached
/// without violating that line anyway.
fn is_edge_covered(
  relative_left_vertex: Vec2,
  relative_right_vertex: Vec2,
  inverse_time_horizon: f32,
  edge_margin: f32,
  existing_lines: &[Line],
) -> bool {
  let scaled_margin = inverse_time_horizon * edge_margin;
  existing_lines.iter().any(|line| {
    determinant(
      inverse_time_horizon * relative_left_vertex - line.point,
      line.direction,
    ) - scaled_margin
      >= -RVO_EPSILON
      && determinant(
        inverse_time_horizon * relative_right_vertex - line.point,
        line.direction,
      ) - scaled_margin
        >= -RVO_EPSILON
  })
}

pub(crate) fn get_line_for_agent_to_segment(
  agent: &Agent,
  segment: &ObstacleSegment,
  time_horizon: f32,
  existing_lines: &[Line],
) -> Option<Line> {
  let inverse_time_horizon = 1.0 / time_horizon;
  let edge_margin = agent.radius + segment.thickness;

  let mut left_vertex = segment.p1;
  let mut right_vertex = segment.p2;

  let relative_left_vertex = left_vertex.point - agent.position;
  let relative_right_vertex = right_vertex.point - agent.position;

  if is_edge_covered(
    relative_left_vertex,
    relative_right_vertex,
    inverse_time_horizon,
    edge_margin,
    existing_lines,
  ) {
    return None;
  }

  let dist_left_squared = relative_left_vertex.length_squared();
  let dist_right_squared = relative_right_vertex.length_squared();
  let margin_squared = edge_margin * edge_margin;

  // Where along the edge the agent's position projects to.
  let edge_vector = right_vertex.point - left_vertex.point;
  let edge_t =
    (-relative_left_vertex).dot(edge_vector) / edge_vector.length_squared();
  let dist_to_edge_line_squared =
    (-relative_left_vertex - edge_t * edge_vector).length_squared();

  // Collisions only restrict velocities that go further into the obstacle.
  if edge_t < 0.0 && dist_left_squared <= margin_squared {
    // Colliding with the left vertex. A concave vertex is always dominated by
    // the adjoining edge's constraint.
    return left_vertex.convex.then(|| Line {
      point: Vec2::ZERO,
      direction: relative_left_vertex.perp().normalize(),
    });
  } else if edge_t > 1.0 && dist_right_squared <= margin_squared {
    // Colliding with the right vertex. Skip if concave, or if the next segment
    // will produce the same constraint.
    return (right_vertex.convex
      && determinant(relative_right_vertex, right_vertex.direction) >= 0.0)
      .then(|| Line {
        point: Vec2::ZERO,
        direction: relative_right_vertex.perp().normalize(),
      });
  } else if (0.0..=1.0).contains(&edge_t)
    && dist_to_edge_line_squared <= margin_squared
  {
    return Some(Line { point: Vec2::ZERO, direction: -left_vertex.direction });
  }

  // No collision, so the velocity obstacle is the edge scaled by the time
  // horizon (the cut-off) plus the shadow it casts away from the origin. The
  // shadow is bounded by the two legs.
  let mut left_leg_direction;
  let mut right_leg_direction;

  if edge_t < 0.0 && dist_to_edge_line_squared <= margin_squared {
    // The edge is viewed obliquely, so the left vertex hides the right one and
    // defines both legs.
    if !left_vertex.convex {
      return None;
    }

    right_vertex = left_vertex;
    left_leg_direction = left_leg(relative_left_vertex, edge_margin);
    right_leg_direction = right_leg(relative_left_vertex, edge_margin);
  } else if edge_t > 1.0 && dist_to_edge_line_squared <= margin_squared {
    // Same as above, with the right vertex hiding the left one.
    if !right_vertex.convex {
      return None;
    }

    left_vertex = right_vertex;
    left_leg_direction = left_leg(relative_right_vertex, edge_margin);
    right_leg_direction = right_leg(relative_right_vertex, edge_margin);
  } else {
    // A concave vertex has no shadow of its own, so the leg just continues the
    // cut-off line.
    left_leg_direction = if left_vertex.convex {
      left_leg(relative_left_vertex, edge_margin)
    } else {
      -left_vertex.direction
    };

    right_leg_direction = if right_vertex.convex {
      right_leg(relative_right_vertex, edge_margin)
    } else {
      left_vertex.direction
    };
  }

  // A leg at a convex vertex must not point into the neighbouring edge. If it
  // does, the neighbouring edge is used instead, and a velocity projecting
  // onto that "foreign" leg produces no line, since the neighbouring segment
  // produces it.
  let mut is_left_leg_foreign = false;
  let mut is_right_leg_foreign = false;

  if left_vertex.convex
    && determinant(left_leg_direction, -left_vertex.prev_inv_direction) >= 0.0
  {
    left_leg_direction = -left_vertex.prev_inv_direction;
    is_left_leg_foreign = true;
  }

  if right_vertex.convex
    && determinant(right_leg_direction, right_vertex.direction) <= 0.0
  {
    right_leg_direction = right_vertex.direction;
    is_right_leg_foreign = true;
  }

  // The vertices may have been swapped, so recompute from the (possibly new)
  // vertices.
  let left_cutoff = inverse_time_horizon * (left_vertex.point - agent.position);
  let right_cutoff =
    inverse_time_horizon * (right_vertex.point - agent.position);
  let cutoff_vector = right_cutoff - left_cutoff;
  let cutoff_radius = inverse_time_horizon * edge_margin;

  let is_degenerate_edge = left_vertex.edge_slot == right_vertex.edge_slot;

  let velocity = agent.velocity;

  // Where the velocity projects to along the cut-off line. For a degenerate
  // edge, pretend it lands in the middle.
  let t_cutoff = if is_degenerate_edge {
    0.5
  } else {
    (velocity - left_cutoff).dot(cutoff_vector) / cutoff_vector.length_squared()
  };
  let t_left_leg = (velocity - left_cutoff).dot(left_leg_direction);
  let t_right_leg = (velocity - right_cutoff).dot(right_leg_direction);

  if (t_cutoff < 0.0 && t_left_leg < 0.0)
    || (is_degenerate_edge && t_left_leg < 0.0 && t_right_leg < 0.0)
  {
    // Project onto the left cut-off circle.
    let unit_w = (velocity - left_cutoff).normalize();
    return Some(Line {
      direction: -unit_w.perp(),
      point: left_cutoff + cutoff_radius * unit_w,
    });
  } else if t_cutoff > 1.0 && t_right_leg < 0.0 {
    // Project onto the right cut-off circle.
    let unit_w = (velocity - right_cutoff).normalize();
    return Some(Line {
      direction: -unit_w.perp(),
      point: right_cutoff + cutoff_radius * unit_w,
    });
  }

  // Otherwise project onto whichever of the cut-off line, left leg and right
  // leg is closest to the velocity.
  let cutoff_distance_squared =
    if !(0.0..=1.0).contains(&t_cutoff) || is_degenerate_edge {
      f32::INFINITY
    } else {
      (velocity - (left_cutoff + t_cutoff * cutoff_vector)).length_squared()
    };
  let left_leg_distance_squared = if t_left_leg < 0.0 {
    f32::INFINITY
  } else {
    (velocity - (left_cutoff + t_left_leg * left_leg_direction))
      .length_squared()
  };
  let right_leg_distance_squared = if t_right_leg < 0.0 {
    f32::INFINITY
  } else {
    (velocity - (right_cutoff + t_right_leg * right_leg_direction))
      .length_squared()
  };

  if cutoff_distance_squared <= left_leg_distance_squared
    && cutoff_distance_squared <= right_leg_distance_squared
  {
    let direction = -left_vertex.direction;
    Some(Line {
      direction,
      point: left_cutoff + cutoff_radius * direction.perp(),
    })
  } else if left_leg_distance_squared <= right_leg_distance_squared {
    (!is_left_leg_foreign).then(|| Line {
      direction: left_leg_direction,
      point: left_cutoff + cutoff_radius * left_leg_direction.perp(),
    })
  } else {
    (!is_right_leg_foreign).then(|| {
      let direction = -right_leg_direction;
      Line { direction, point: right_cutoff + cutoff_radius * direction.perp() }
    })
  }
}

#[cfg(test)]
#[path = "obstacles_test.rs"]
mod test;
