use std::{
  ops::{Deref, DerefMut},
  sync::{Mutex, PoisonError},
};

use crate::{Line, NeighbourhoodCollector, ObstacleSegment};

/// Reusable storage for the constraints of a single avoidance solve.
#[derive(Default, Clone, Debug)]
pub struct ConstraintBuffers {
  /// Candidate obstacle segments, ordered by distance before use.
  pub(crate) obstacles: Vec<(f32, ObstacleSegment)>,
  /// The constraint lines of the last solve. Obstacle lines come first.
  pub(crate) lines: Vec<Line>,
  /// Scratch for the relaxed program when the constraints are infeasible.
  pub(crate) projected_lines: Vec<Line>,
}

impl ConstraintBuffers {
  /// The constraint lines built by the most recent solve.
  pub fn lines(&self) -> &[Line] {
    &self.lines
  }

  pub fn clear(&mut self) {
    self.obstacles.clear();
    self.lines.clear();
    self.projected_lines.clear();
  }
}

/// Everything a worker needs to process agents one after another without
/// allocating. Buffers only ever grow.
#[derive(Default, Clone, Debug)]
pub struct ScratchBuffers {
  pub collector: NeighbourhoodCollector,
  pub constraints: ConstraintBuffers,
}

impl ScratchBuffers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn clear(&mut self) {
    self.collector.clear();
    self.constraints.clear();
  }
}

/// A pool of [`ScratchBuffers`] shared between workers. Acquired buffers go
/// back to the pool when their guard is dropped, so a worker processing a
/// batch of agents keeps reusing the same allocations.
#[derive(Default, Debug)]
pub struct ScratchPool {
  free: Mutex<Vec<ScratchBuffers>>,
}

impl ScratchPool {
  pub fn new() -> Self {
    Self::default()
  }

  /// Takes a cleared set of buffers from the pool, creating one if the pool
  /// is empty.
  pub fn acquire(&self) -> PooledScratch<'_> {
    let mut buffers = self
      .free
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .pop()
      .unwrap_or_default();
    buffers.clear();
    PooledScratch { pool: self, buffers: Some(buffers) }
  }

  /// The number of buffers currently waiting in the pool.
  pub fn available(&self) -> usize {
    self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  fn release(&self, buffers: ScratchBuffers) {
    self.free.lock().unwrap_or_else(PoisonError::into_inner).push(buffers);
  }
}

/// Buffers on loan from a [`ScratchPool`].
#[derive(Debug)]
pub struct PooledScratch<'pool> {
  pool: &'pool ScratchPool,
  // Only None while being dropped.
  buffers: Option<ScratchBuffers>,
}

impl Deref for PooledScratch<'_> {
  type Target = ScratchBuffers;

  fn deref(&self) -> &Self::Target {
    self.buffers.as_ref().expect("buffers are present until drop")
  }
}

impl DerefMut for PooledScratch<'_> {
  fn deref_mut(&mut self) -> &mut Self::Target {
    self.buffers.as_mut().expect("buffers are present until drop")
  }
}

impl Drop for PooledScratch<'_> {
  fn drop(&mut self) {
    if let Some(buffers) = self.buffers.take() {
      self.pool.release(buffers);
    }
  }
}

#[cfg(test)]
#[path = "scratch_test.rs"]
mod test;
