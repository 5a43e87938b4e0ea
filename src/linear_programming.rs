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

use glam::Vec2;
use log::debug;

use crate::common::{determinant, RVO_EPSILON};

/// A half-plane constraint: the boundary passes through `point` along
/// `direction`, and the allowed side is to the left of `direction`. A value
/// `x` satisfies the line when `violation(x) <= 0`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Line {
  pub point: Vec2,
  /// Unit length.
  pub direction: Vec2,
}

impl Line {
  /// Signed distance of `value` past the boundary, into the forbidden side.
  pub fn violation(&self, value: Vec2) -> f32 {
    determinant(self.direction, self.point - value)
  }
}

/// Finds the value inside the disk of `radius` that is closest to
/// `preferred_value` and satisfies every line in `constraints`.
///
/// When no such value exists, the first `rigid_constraint_count` lines are
/// kept as hard limits and the rest are pushed back evenly until they can all
/// be met, so the result is the value with the smallest worst violation. The
/// rigid prefix itself has to be satisfiable.
///
/// `projected_constraints` is scratch space. Its contents on return are
/// unspecified.
pub fn solve_linear_program(
  constraints: &[Line],
  rigid_constraint_count: usize,
  radius: f32,
  preferred_value: Vec2,
  projected_constraints: &mut Vec<Line>,
) -> Vec2 {
  match solve_linear_program_2d(
    constraints,
    radius,
    &OptimalValue::Point(preferred_value),
  ) {
    LinearProgram2DResult::Feasible(optimal_value) => optimal_value,
    LinearProgram2DResult::Infeasible {
      index_of_failed_line,
      partial_value,
    } => {
      debug!(
        "2D linear program failed on line {} of {} ({} rigid), relaxing",
        index_of_failed_line,
        constraints.len(),
        rigid_constraint_count
      );
      solve_linear_program_3d(
        constraints,
        rigid_constraint_count,
        radius,
        index_of_failed_line,
        partial_value,
        projected_constraints,
      )
    }
  }
}

/// What the programs below optimize for.
pub(crate) enum OptimalValue {
  /// Minimize the distance to a point.
  Point(Vec2),
  /// Go as far as possible along a unit vector.
  Direction(Vec2),
}

/// Optimizes over the chord of the `radius` disk that lies on `line`, cut down
/// further by every line in `constraints`. Fails when nothing of the chord
/// survives.
pub(crate) fn solve_linear_program_along_line(
  line: &Line,
  radius: f32,
  constraints: &[Line],
  optimal_value: &OptimalValue,
) -> Result<Vec2, ()> {
  // Points on the line are `line.point + t * line.direction`. Solving
  // `|point|^2 = radius^2` for `t` gives the chord `projection +- half_chord`.
  let projection = -line.point.dot(line.direction);
  let half_chord_squared =
    projection * projection + radius * radius - line.point.length_squared();
  if half_chord_squared < 0.0 {
    // Misses the disk.
    return Err(());
  }

  let half_chord = half_chord_squared.sqrt();
  let mut t_min = projection - half_chord;
  let mut t_max = projection + half_chord;

  for constraint in constraints {
    let denominator = determinant(line.direction, constraint.direction);
    let numerator =
      determinant(constraint.direction, line.point - constraint.point);

    if denominator.abs() <= RVO_EPSILON {
      // Parallel: `line` is either entirely allowed or entirely forbidden.
      if numerator < 0.0 {
        return Err(());
      }
      continue;
    }

    let t = numerator / denominator;
    if denominator >= 0.0 {
      t_max = t_max.min(t);
    } else {
      t_min = t_min.max(t);
    }

    if t_min > t_max {
      return Err(());
    }
  }

  let t = match optimal_value {
    &OptimalValue::Direction(direction) => {
      if direction.dot(line.direction) > 0.0 {
        t_max
      } else {
        t_min
      }
    }
    &OptimalValue::Point(point) => {
      line.direction.dot(point - line.point).clamp(t_min, t_max)
    }
  };

  Ok(line.point + t * line.direction)
}

#[derive(PartialEq, Debug)]
pub(crate) enum LinearProgram2DResult {
  Feasible(Vec2),
  /// No value satisfies `constraints[..=index_of_failed_line]`.
  /// `partial_value` is the optimum of the lines before it.
  Infeasible { index_of_failed_line: usize, partial_value: Vec2 },
}

/// Adds `constraints` one at a time, starting from the unconstrained optimum
/// in the `radius` disk. Whenever the current value breaks the next line, the
/// new optimum has to lie on that line, so it is found with
/// [`solve_linear_program_along_line`] against the lines seen so far.
pub(crate) fn solve_linear_program_2d(
  constraints: &[Line],
  radius: f32,
  optimal_value: &OptimalValue,
) -> LinearProgram2DResult {
  let mut value = match optimal_value {
    &OptimalValue::Direction(direction) => direction * radius,
    &OptimalValue::Point(point) if point.length_squared() > radius * radius => {
      point.normalize() * radius
    }
    &OptimalValue::Point(point) => point,
  };

  for (index, constraint) in constraints.iter().enumerate() {
    if constraint.violation(value) <= 0.0 {
      continue;
    }

    match solve_linear_program_along_line(
      constraint,
      radius,
      &constraints[..index],
      optimal_value,
    ) {
      Ok(on_line) => value = on_line,
      Err(()) => {
        return LinearProgram2DResult::Infeasible {
          index_of_failed_line: index,
          partial_value: value,
        }
      }
    }
  }

  LinearProgram2DResult::Feasible(value)
}

/// Relaxes the non-rigid lines after [`solve_linear_program_2d`] gave up at
/// `index_of_failed_line`, starting from its `partial_value`.
///
/// Each remaining line that is violated by more than the current worst
/// violation becomes the new worst. The value is then moved as far into that
/// line as possible while respecting the rigid lines and violating no
/// earlier relaxed line by more than this one. That second condition is a
/// set of bisector lines, one per earlier relaxed line.
///
/// The inner program can only fail through rounding. In that case the value
/// and the worst violation are both left alone.
pub(crate) fn solve_linear_program_3d(
  constraints: &[Line],
  rigid_constraint_count: usize,
  radius: f32,
  index_of_failed_line: usize,
  partial_value: Vec2,
  projected_constraints: &mut Vec<Line>,
) -> Vec2 {
  debug_assert!(rigid_constraint_count <= constraints.len());

  let mut worst_violation = 0.0;
  let mut value = partial_value;

  for (index, constraint) in
    constraints.iter().enumerate().skip(index_of_failed_line)
  {
    if constraint.violation(value) <= worst_violation {
      continue;
    }

    projected_constraints.clear();
    projected_constraints
      .extend_from_slice(&constraints[..rigid_constraint_count]);

    for earlier in &constraints[rigid_constraint_count.min(index)..index] {
      let denominator = determinant(constraint.direction, earlier.direction);

      let crossing = if denominator.abs() <= RVO_EPSILON {
        if constraint.direction.dot(earlier.direction) > 0.0 {
          // Same orientation: moving into `constraint` moves into `earlier`
          // at the same rate.
          continue;
        }
        // Facing each other: the bisector runs down the middle.
        (constraint.point + earlier.point) * 0.5
      } else {
        let t =
          determinant(earlier.direction, constraint.point - earlier.point)
            / denominator;
        constraint.point + t * constraint.direction
      };

      projected_constraints.push(Line {
        point: crossing,
        direction: (earlier.direction - constraint.direction).normalize(),
      });
    }

    if let LinearProgram2DResult::Feasible(relaxed) = solve_linear_program_2d(
      projected_constraints,
      radius,
      &OptimalValue::Direction(constraint.direction.perp()),
    ) {
      value = relaxed;
      worst_violation = constraint.violation(value);
    }
  }

  value
}

#[cfg(test)]
#[path = "linear_programming_test.rs"]
mod test;
