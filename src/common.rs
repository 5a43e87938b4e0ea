use glam::Vec2;

/// The tolerance used for all near-zero comparisons (parallel lines, covered
/// obstacle edges).
pub const RVO_EPSILON: f32 = 0.00001;

/// Computes the 2D determinant of `a` and `b`, aka the 2D cross product.
pub fn determinant(a: Vec2, b: Vec2) -> f32 {
  a.x * b.y - a.y * b.x
}

/// Computes the signed (doubled) area of the triangle `a`, `b`, `c`. This is
/// positive when `c` lies to the left of the directed line from `a` to `b`.
pub fn left_of(a: Vec2, b: Vec2, c: Vec2) -> f32 {
  determinant(a - c, b - a)
}

/// Computes the direction of the tangent from the origin that grazes the left
/// side of the circle at `relative_center` with `radius`. The origin must be
/// outside the circle.
pub fn left_leg(relative_center: Vec2, radius: f32) -> Vec2 {
  let distance_squared = relative_center.length_squared();
  let leg = (distance_squared - radius * radius).sqrt();
  (relative_center * leg + relative_center.perp() * radius) / distance_squared
}

/// The mirror of [`left_leg`], grazing the right side of the circle.
pub fn right_leg(relative_center: Vec2, radius: f32) -> Vec2 {
  let distance_squared = relative_center.length_squared();
  let leg = (distance_squared - radius * radius).sqrt();
  (relative_center * leg - relative_center.perp() * radius) / distance_squared
}

#[cfg(test)]
#[path = "common_test.rs"]
mod test;
