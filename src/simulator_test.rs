use glam::Vec2;

use crate::{
  commit_velocity, Agent, AgentParameters, AvoidanceOptions, ConfigError,
  Obstacle, ObstacleError, Simulator, DEFAULT_CELL_SIZE,
};

macro_rules! assert_vec_near {
  ($left: expr, $right: expr, $eps: expr) => {{
    let left = $left;
    let right = $right;
    let eps = $eps;
    assert!(
      left.distance(right) < eps,
      "left: {}, right: {}, epsilon: {}",
      left,
      right,
      eps
    );
  }};
}

fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn agent(position: Vec2, radius: f32) -> Agent {
  Agent {
    position,
    velocity: Vec2::ZERO,
    radius,
    max_speed: 2.0,
    avoidance_enabled: true,
  }
}

fn parameters(preferred_velocity: Vec2) -> AgentParameters {
  AgentParameters {
    preferred_velocity,
    avoidance_options: AvoidanceOptions::default(),
  }
}

/// Points every agent at its goal, slowing down on approach.
fn steer_towards(simulator: &mut Simulator, goals: &[Vec2]) {
  for (index, &goal) in goals.iter().enumerate() {
    let agent = simulator.get_agent(index);
    let preferred_velocity =
      (goal - agent.position).clamp_length_max(agent.max_speed);
    simulator.set_preferred_velocity(index, preferred_velocity);
  }
}

#[test]
fn two_agents_swap_places() {
  init_logging();
  let mut simulator = Simulator::new();

  let goals = [Vec2::new(5.0, 0.0), Vec2::new(-5.0, 0.0)];
  simulator.add_agent(agent(goals[1], 0.5), parameters(Vec2::ZERO)).unwrap();
  simulator.add_agent(agent(goals[0], 0.5), parameters(Vec2::ZERO)).unwrap();

  for _ in 0..300 {
    steer_towards(&mut simulator, &goals);
    simulator.step();

    let distance = simulator
      .get_agent(0)
      .position
      .distance(simulator.get_agent(1).position);
    assert!(distance > 0.95, "agents overlapped at distance {}", distance);
  }

  assert_vec_near!(simulator.get_agent(0).position, goals[0], 0.05);
  assert_vec_near!(simulator.get_agent(1).position, goals[1], 0.05);
}

#[test]
fn agent_stops_at_wall() {
  init_logging();
  let mut simulator = Simulator::new();

  simulator
    .add_agent(
      agent(Vec2::new(0.0, -3.0), 0.5),
      parameters(Vec2::new(0.0, 2.0)),
    )
    .unwrap();
  simulator
    .add_obstacle(
      &Obstacle::Open {
        vertices: vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)],
      },
      /* thickness= */ 0.0,
    )
    .unwrap();
  assert_eq!(simulator.get_segments().len(), 2);

  for _ in 0..100 {
    simulator.step();

    let position = simulator.get_agent(0).position;
    for segment in simulator.get_segments() {
      let distance = segment.distance_squared_to(position).sqrt();
      assert!(distance >= 0.5 - 1e-3, "agent entered the wall at {}", position);
    }
  }

  // The agent ends up pressed against the wall.
  assert_vec_near!(simulator.get_agent(0).position, Vec2::new(0.0, -0.5), 0.05);
}

#[test]
fn agents_are_solved_against_the_previous_step() {
  let mut simulator = Simulator::new();

  let positions =
    [Vec2::new(0.0, 0.0), Vec2::new(1.5, 0.5), Vec2::new(-1.0, 1.5)];
  let preferred_velocities =
    [Vec2::new(2.0, 0.0), Vec2::new(-1.0, 0.0), Vec2::new(0.5, -1.0)];
  for (&position, &preferred_velocity) in
    positions.iter().zip(preferred_velocities.iter())
  {
    simulator
      .add_agent(agent(position, 0.5), parameters(preferred_velocity))
      .unwrap();
  }
  simulator
    .add_obstacle(
      &Obstacle::rectangle(Vec2::new(0.0, -2.0), Vec2::ONE, 0.0),
      0.0,
    )
    .unwrap();

  let agents: Vec<Agent> =
    (0..3).map(|index| simulator.get_agent(index).clone()).collect();
  let obstacles: Vec<_> = simulator.get_segments().iter().collect();
  let expected: Vec<Vec2> = agents
    .iter()
    .enumerate()
    .map(|(index, agent)| {
      let neighbours: Vec<&Agent> = agents
        .iter()
        .enumerate()
        .filter(|&(other, _)| other != index)
        .map(|(_, other)| other)
        .collect();
      let velocity = agent.compute_avoiding_velocity(
        &neighbours,
        &obstacles,
        preferred_velocities[index],
        &AvoidanceOptions::default(),
      );
      commit_velocity(agent.velocity, velocity)
    })
    .collect();
  drop(obstacles);

  simulator.step();

  for (index, expected_velocity) in expected.into_iter().enumerate() {
    let agent = simulator.get_agent(index);
    assert_eq!(agent.velocity, expected_velocity);
    assert_vec_near!(
      agent.position,
      positions[index] + expected_velocity * 0.1,
      1e-5
    );
  }
}

#[test]
fn disabled_agent_keeps_velocity() {
  let mut simulator = Simulator::new();

  let mut disabled = agent(Vec2::ZERO, 0.5);
  disabled.velocity = Vec2::new(1.0, 0.0);
  disabled.avoidance_enabled = false;
  simulator.add_agent(disabled, parameters(Vec2::new(-2.0, 0.0))).unwrap();
  simulator
    .add_agent(
      agent(Vec2::new(2.0, 0.0), 0.5),
      parameters(Vec2::new(-2.0, 0.0)),
    )
    .unwrap();

  simulator.step();

  let disabled = simulator.get_agent(0);
  assert_eq!(disabled.velocity, Vec2::new(1.0, 0.0));
  assert_vec_near!(disabled.position, Vec2::new(0.1, 0.0), 1e-6);
  // The enabled agent still slows down for the disabled one.
  assert!(simulator.get_agent(1).velocity.x > -2.0);
}

#[test]
fn each_agent_integrates_with_its_own_time_step() {
  let mut simulator = Simulator::new();

  simulator.add_agent(agent(Vec2::ZERO, 0.5), parameters(Vec2::X)).unwrap();
  simulator
    .add_agent(
      agent(Vec2::new(0.0, 20.0), 0.5),
      AgentParameters {
        preferred_velocity: Vec2::X,
        avoidance_options: AvoidanceOptions {
          time_step: 0.5,
          ..AvoidanceOptions::default()
        },
      },
    )
    .unwrap();

  simulator.step();

  assert_vec_near!(simulator.get_agent(0).position, Vec2::new(0.1, 0.0), 1e-6);
  assert_vec_near!(simulator.get_agent(1).position, Vec2::new(0.5, 20.0), 1e-6);
}

#[test]
fn invalid_inputs_are_rejected() {
  let mut simulator = Simulator::new();

  assert_eq!(
    simulator.add_agent(agent(Vec2::ZERO, -1.0), parameters(Vec2::ZERO)),
    Err(ConfigError::NonPositive { field: "radius", value: -1.0 })
  );
  let mut bad_parameters = parameters(Vec2::ZERO);
  bad_parameters.avoidance_options.obstacle_time_horizon = 0.0;
  assert_eq!(
    simulator.add_agent(agent(Vec2::ZERO, 1.0), bad_parameters),
    Err(ConfigError::NonPositive { field: "obstacle_time_horizon", value: 0.0 })
  );
  assert_eq!(simulator.get_agent_count(), 0);

  assert_eq!(
    simulator
      .add_obstacle(&Obstacle::Closed { vertices: vec![Vec2::ZERO] }, 0.0),
    Err(ObstacleError::TooFewVertices { count: 1 })
  );
  assert!(simulator.get_segments().is_empty());
}

#[test]
fn accessors_and_removal() {
  let mut simulator = Simulator::with_cell_size(2.0).unwrap();

  let first =
    simulator.add_agent(agent(Vec2::ZERO, 1.0), parameters(Vec2::X)).unwrap();
  let second = simulator
    .add_agent(agent(Vec2::new(10.0, 0.0), 1.0), parameters(Vec2::Y))
    .unwrap();
  assert_eq!((first, second), (0, 1));
  assert_eq!(simulator.get_agent_count(), 2);
  assert_eq!(simulator.get_agent_parameters(1).preferred_velocity, Vec2::Y);

  simulator.get_agent_mut(1).position = Vec2::new(-10.0, 0.0);
  simulator.get_agent_parameters_mut(1).avoidance_options.time_horizon = 3.0;
  simulator.set_preferred_velocity(0, Vec2::NEG_X);
  assert_eq!(simulator.get_agent_parameters(0).preferred_velocity, Vec2::NEG_X);

  let removed = simulator.remove_agent(0);
  assert_eq!(removed.position, Vec2::ZERO);

  // The second agent shifts down into the first slot.
  assert_eq!(simulator.get_agent_count(), 1);
  assert_eq!(simulator.get_agent(0).position, Vec2::new(-10.0, 0.0));
  assert_eq!(
    simulator.get_agent_parameters(0).avoidance_options.time_horizon,
    3.0
  );
}

#[test]
fn cell_size_must_be_positive() {
  assert_eq!(
    Simulator::with_cell_size(0.0).err(),
    Some(ConfigError::NonPositive { field: "cell_size", value: 0.0 })
  );
  assert_eq!(
    Simulator::with_cell_size(-2.0).err(),
    Some(ConfigError::NonPositive { field: "cell_size", value: -2.0 })
  );
  assert_eq!(Simulator::new().get_grid().cell_size(), DEFAULT_CELL_SIZE);
}

#[test]
fn grid_stays_bounded_while_agents_move() {
  let mut simulator = Simulator::new();

  simulator
    .add_agent(agent(Vec2::new(-200.0, 20.0), 0.5), parameters(Vec2::X * 2.0))
    .unwrap();
  simulator
    .add_obstacle(
      &Obstacle::Open {
        vertices: vec![Vec2::new(-200.0, 0.0), Vec2::new(200.0, 0.0)],
      },
      /* thickness= */ 0.0,
    )
    .unwrap();
  let obstacle_cells = simulator.get_grid().obstacle_cell_count();
  assert!(obstacle_cells > 0);

  let start = simulator.get_agent(0).position;
  for _ in 0..1000 {
    simulator.step();
    assert_eq!(simulator.get_grid().agent_cell_count(), 1);
    assert_eq!(simulator.get_grid().obstacle_cell_count(), obstacle_cells);
  }
  // The agent crossed many cells on its way.
  assert!(simulator.get_agent(0).position.x - start.x > 100.0);
}

#[test]
fn obstacles_added_between_steps_are_avoided() {
  let mut simulator = Simulator::new();

  simulator
    .add_agent(
      agent(Vec2::new(0.0, -3.0), 0.5),
      parameters(Vec2::new(0.0, 2.0)),
    )
    .unwrap();
  simulator.step();

  simulator
    .add_obstacle(
      &Obstacle::Open {
        vertices: vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)],
      },
      /* thickness= */ 0.0,
    )
    .unwrap();
  for _ in 0..100 {
    simulator.step();
  }

  let position = simulator.get_agent(0).position;
  assert!(position.y < -0.5 + 1e-3, "agent passed the wall at {}", position);
}
