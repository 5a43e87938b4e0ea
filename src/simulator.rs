use glam::Vec2;
use log::trace;
use rayon::prelude::*;

use crate::{
  commit_velocity, Agent, AvoidanceOptions, ConfigError, NeighbourhoodQuery,
  Obstacle, ObstacleError, ObstacleSegment, ScratchBuffers, ScratchPool,
  UniformGrid,
};

/// Runs avoidance for a set of agents among static obstacles. Every agent is
/// solved against the velocities committed on the previous step, so agents are
/// processed in parallel and the results only become visible on the next step.
/// Obstacles go into the spatial grid once, when they are added.
pub struct Simulator {
  agents: Vec<Agent>,
  agent_parameters: Vec<AgentParameters>,
  segments: Vec<ObstacleSegment>,
  grid: UniformGrid,
  next_velocities: Vec<Vec2>,
  scratch_pool: ScratchPool,
}

/// Per-agent inputs that are not part of the agent's physical state.
#[derive(Clone, PartialEq, Debug)]
pub struct AgentParameters {
  /// The velocity the agent would like to move at, usually toward its goal.
  pub preferred_velocity: Vec2,
  pub avoidance_options: AvoidanceOptions,
}

impl Default for Simulator {
  fn default() -> Self {
    Self::new()
  }
}

impl Simulator {
  /// Creates a simulator whose spatial grid uses cells of
  /// [`DEFAULT_CELL_SIZE`](crate::DEFAULT_CELL_SIZE).
  pub fn new() -> Self {
    Self::with_grid(UniformGrid::default())
  }

  /// Creates a simulator whose spatial grid uses cells of `cell_size`.
  pub fn with_cell_size(cell_size: f32) -> Result<Self, ConfigError> {
    Ok(Self::with_grid(UniformGrid::new(cell_size)?))
  }

  fn with_grid(grid: UniformGrid) -> Self {
    Self {
      agents: Vec::new(),
      agent_parameters: Vec::new(),
      segments: Vec::new(),
      grid,
      next_velocities: Vec::new(),
      scratch_pool: ScratchPool::new(),
    }
  }

  /// Adds an agent and returns its index.
  pub fn add_agent(
    &mut self,
    agent: Agent,
    agent_parameters: AgentParameters,
  ) -> Result<usize, ConfigError> {
    agent.validate()?;
    agent_parameters.avoidance_options.validate()?;

    self.agents.push(agent);
    self.agent_parameters.push(agent_parameters);
    Ok(self.agents.len() - 1)
  }

  /// Bakes `obstacle` into segments with `thickness` and adds them.
  pub fn add_obstacle(
    &mut self,
    obstacle: &Obstacle,
    thickness: f32,
  ) -> Result<(), ObstacleError> {
    let segments = obstacle.to_segments(thickness)?;
    for segment in segments {
      self.grid.insert_obstacle(self.segments.len(), &segment);
      self.segments.push(segment);
    }
    Ok(())
  }

  /// Removes the agent at `agent_index`. Agents after it shift down by one.
  pub fn remove_agent(&mut self, agent_index: usize) -> Agent {
    self.agent_parameters.remove(agent_index);
    self.agents.remove(agent_index)
  }

  pub fn get_agent(&self, agent_index: usize) -> &Agent {
    &self.agents[agent_index]
  }

  pub fn get_agent_mut(&mut self, agent_index: usize) -> &mut Agent {
    &mut self.agents[agent_index]
  }

  pub fn get_agent_count(&self) -> usize {
    self.agents.len()
  }

  pub fn get_segments(&self) -> &[ObstacleSegment] {
    &self.segments
  }

  pub fn get_grid(&self) -> &UniformGrid {
    &self.grid
  }

  pub fn get_agent_parameters(&self, agent_index: usize) -> &AgentParameters {
    &self.agent_parameters[agent_index]
  }

  pub fn get_agent_parameters_mut(
    &mut self,
    agent_index: usize,
  ) -> &mut AgentParameters {
    &mut self.agent_parameters[agent_index]
  }

  pub fn set_preferred_velocity(
    &mut self,
    agent_index: usize,
    preferred_velocity: Vec2,
  ) {
    self.agent_parameters[agent_index].preferred_velocity = preferred_velocity;
  }

  /// Computes new velocities for every agent, commits them, and moves each
  /// agent by its own `time_step`.
  pub fn step(&mut self) {
    self.grid.clear_agents();
    for (index, agent) in self.agents.iter().enumerate() {
      self.grid.insert_agent(index, agent.position);
    }

    let agents = &self.agents;
    let agent_parameters = &self.agent_parameters;
    let segments = &self.segments;
    let grid = &self.grid;
    let scratch_pool = &self.scratch_pool;

    (0..agents.len())
      .into_par_iter()
      .map_init(
        || scratch_pool.acquire(),
        |scratch, index| {
          compute_next_velocity(
            index,
            agents,
            &agent_parameters[index],
            segments,
            grid,
            scratch,
          )
        },
      )
      .collect_into_vec(&mut self.next_velocities);

    for ((agent, parameters), &velocity) in self
      .agents
      .iter_mut()
      .zip(self.agent_parameters.iter())
      .zip(self.next_velocities.iter())
    {
      agent.velocity = velocity;
      agent.position += velocity * parameters.avoidance_options.time_step;
    }

    trace!(
      "Stepped {} agents against {} obstacle segments",
      self.agents.len(),
      self.segments.len()
    );
  }
}

/// Solves the agent at `index` against the previous step's state. Only reads
/// shared data, so this may run concurrently for all agents.
fn compute_next_velocity(
  index: usize,
  agents: &[Agent],
  parameters: &AgentParameters,
  segments: &[ObstacleSegment],
  grid: &impl NeighbourhoodQuery,
  scratch: &mut ScratchBuffers,
) -> Vec2 {
  let agent = &agents[index];
  if !agent.avoidance_enabled {
    return agent.velocity;
  }

  let options = &parameters.avoidance_options;
  let ScratchBuffers { collector, constraints } = scratch;
  collector.clear();
  grid.query(agent.position, options.neighbour_query_extent, collector);

  let velocity = agent.compute_avoiding_velocity_with_buffers(
    collector
      .neighbours
      .iter()
      .filter(|&&other| other != index)
      .map(|&other| &agents[other]),
    collector.obstacles.iter().map(|&segment| &segments[segment]),
    parameters.preferred_velocity,
    options,
    constraints,
  );

  commit_velocity(agent.velocity, velocity)
}

#[cfg(test)]
#[path = "simulator_test.rs"]
mod test;
