use glam::Vec2;

use super::*;
use crate::Line;

#[test]
fn released_buffers_are_reused() {
  let pool = ScratchPool::new();
  assert_eq!(pool.available(), 0);

  {
    let mut scratch = pool.acquire();
    scratch.collector.neighbours.extend(0..100);
    scratch.constraints.lines.push(Line {
      point: Vec2::ZERO,
      direction: Vec2::new(1.0, 0.0),
    });
    assert_eq!(pool.available(), 0);
  }
  assert_eq!(pool.available(), 1);

  let scratch = pool.acquire();
  assert_eq!(pool.available(), 0);
  // The buffers come back cleared, but keep their allocations.
  assert!(scratch.collector.neighbours.is_empty());
  assert!(scratch.collector.neighbours.capacity() >= 100);
  assert!(scratch.constraints.lines().is_empty());
}

#[test]
fn concurrent_loans_get_separate_buffers() {
  let pool = ScratchPool::new();

  let mut first = pool.acquire();
  let mut second = pool.acquire();
  first.collector.obstacles.push(1);
  second.collector.obstacles.push(2);
  assert_eq!(first.collector.obstacles, [1]);
  assert_eq!(second.collector.obstacles, [2]);

  drop(first);
  drop(second);
  assert_eq!(pool.available(), 2);
}

#[test]
fn clear_empties_every_buffer() {
  let mut buffers = ScratchBuffers::new();
  buffers.collector.neighbours.push(3);
  buffers.constraints.projected_lines.push(Line {
    point: Vec2::ONE,
    direction: Vec2::new(0.0, 1.0),
  });

  buffers.clear();

  assert!(buffers.collector.neighbours.is_empty());
  assert!(buffers.constraints.projected_lines.is_empty());
}
