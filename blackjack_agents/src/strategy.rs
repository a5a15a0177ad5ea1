pub mod mcts;
pub mod qlearning;
pub mod rollout;
pub mod simulated;

use std::time::{Duration, Instant};

use crate::{Action, GameError, ObservableState, StepResult};

/// Action taken by the search agents when they have no budget to search with.
pub const FALLBACK_ACTION: Action = Action::Stand;

/// A player seat. The table asks for a decision whenever it is the player's
/// turn and reports the result of every applied action back.
pub trait Agent {
    fn name(&self) -> &str;

    fn decide(&mut self, state: &ObservableState) -> Result<Action, GameError>;

    fn learn(&mut self, _state: &ObservableState, _action: Action, _step: &StepResult) {}
}

/// Hits below a fixed total and stands otherwise, the way the dealer plays.
/// Used as the baseline the other agents are compared against.
#[derive(Debug, Clone)]
pub struct ThresholdAgent {
    stand_on: u16,
}

impl ThresholdAgent {
    pub fn new(stand_on: u16) -> Self {
        Self { stand_on }
    }
}

impl Default for ThresholdAgent {
    fn default() -> Self {
        Self::new(17)
    }
}

impl Agent for ThresholdAgent {
    fn name(&self) -> &str {
        "threshold"
    }

    fn decide(&mut self, state: &ObservableState) -> Result<Action, GameError> {
        if state.player_total < self.stand_on && state.is_legal(Action::Hit) {
            Ok(Action::Hit)
        } else {
            Ok(Action::Stand)
        }
    }
}

/// How long a search agent may think about one decision. The iteration count
/// is whatever unit the agent iterates in: MCTS cycles, or playouts per action
/// for the rollout agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchBudget {
    Iterations(u32),
    Time(Duration),
    IterationsWithin { iterations: u32, time: Duration },
}

impl SearchBudget {
    pub fn is_zero(&self) -> bool {
        match *self {
            SearchBudget::Iterations(iterations) => iterations == 0,
            SearchBudget::Time(time) => time.is_zero(),
            SearchBudget::IterationsWithin { iterations, time } => {
                iterations == 0 || time.is_zero()
            }
        }
    }

    pub fn start(&self) -> BudgetClock {
        let (max_iterations, time_limit) = match *self {
            SearchBudget::Iterations(iterations) => (Some(iterations), None),
            SearchBudget::Time(time) => (None, Some(time)),
            SearchBudget::IterationsWithin { iterations, time } => (Some(iterations), Some(time)),
        };
        BudgetClock {
            started: Instant::now(),
            max_iterations,
            time_limit,
        }
    }
}

/// A running budget. Only ever consulted between whole iterations.
#[derive(Debug, Clone, Copy)]
pub struct BudgetClock {
    started: Instant,
    max_iterations: Option<u32>,
    time_limit: Option<Duration>,
}

impl BudgetClock {
    /// Whether one more iteration may start after `completed` ones.
    pub fn allows(&self, completed: u32) -> bool {
        self.max_iterations.map_or(true, |max| completed < max) && !self.time_expired()
    }

    pub fn time_expired(&self) -> bool {
        self.time_limit
            .map_or(false, |limit| self.started.elapsed() >= limit)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Picks the action with the highest score. `actions` must be in priority
/// order: a later action has to be strictly better to win a tie.
pub(crate) fn best_by_priority<F>(actions: &[Action], mut score: F) -> Option<Action>
where
    F: FnMut(Action) -> Option<f64>,
{
    let mut best: Option<(Action, f64)> = None;
    for &action in actions {
        let Some(value) = score(action) else {
            continue;
        };
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((action, value)),
        }
    }
    best.map(|(action, _)| action)
}
