use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strum::{EnumCount, IntoEnumIterator};
use tracing::trace;

use super::{best_by_priority, Agent, FALLBACK_ACTION};
use crate::{Action, GameError, ObservableState, StateArray, StepResult};

/// Deck heat reduced to three levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeatBucket {
    Cold,
    Neutral,
    Hot,
}

impl HeatBucket {
    pub fn from_heat(heat: f64, threshold: f64) -> Self {
        if heat >= threshold {
            HeatBucket::Hot
        } else if heat <= -threshold {
            HeatBucket::Cold
        } else {
            HeatBucket::Neutral
        }
    }
}

/// Discretised observation used to index the Q-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    /// Player total, every bust total folded into 22.
    pub player_total: u8,
    pub dealer_up_card: u8,
    pub usable_ace: bool,
    pub heat: HeatBucket,
}

impl StateKey {
    pub const BUST_TOTAL: u8 = 22;

    pub fn encode(state: &ObservableState, heat_threshold: f64) -> Self {
        Self {
            player_total: state.player_total.min(Self::BUST_TOTAL as u16) as u8,
            dealer_up_card: state.dealer_up_card,
            usable_ace: state.player_usable_ace,
            heat: HeatBucket::from_heat(state.deck_heat, heat_threshold),
        }
    }
}

/// Estimated value of every action in one state, indexed by `Action::index`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionValues(pub [f64; Action::COUNT]);

impl ActionValues {
    pub fn get(&self, action: Action) -> f64 {
        self.0[action.index()]
    }

    pub fn set(&mut self, action: Action, value: f64) {
        self.0[action.index()] = value;
    }

    /// Highest value among `actions`, 0 if there is none.
    pub fn max_over(&self, actions: &[Action]) -> f64 {
        actions
            .iter()
            .map(|action| self.get(*action))
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Best action among `actions`, ties to the earlier one.
    pub fn greedy(&self, actions: &[Action]) -> Option<Action> {
        best_by_priority(actions, |action| Some(self.get(action)))
    }
}

/// What followed the updated transition.
#[derive(Debug, Clone, Copy)]
pub enum NextState<'a> {
    Terminal,
    Continue {
        key: StateKey,
        legal_actions: &'a [Action],
    },
}

/// Lazily zero-initialised table of action values. Reading an unseen state
/// never inserts it.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    values: StateArray<StateKey, ActionValues>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self, key: &StateKey) -> ActionValues {
        self.values.get(key).copied().unwrap_or_default()
    }

    /// Values of a state that has been written, None otherwise.
    pub fn stored(&self, key: &StateKey) -> Option<ActionValues> {
        self.values.get(key).copied()
    }

    pub fn value(&self, key: &StateKey, action: Action) -> f64 {
        self.values(key).get(action)
    }

    pub fn set(&mut self, key: &StateKey, action: Action, value: f64) {
        self.values[key].set(action, value);
    }

    /// Number of states written so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &ActionValues)> {
        self.values.iter()
    }

    /// One temporal-difference step:
    /// `Q[s,a] += α (r + γ max_a' Q[s',a'] - Q[s,a])`, with no future value
    /// after a terminal transition. Returns the new `Q[s,a]`.
    pub fn update(
        &mut self,
        key: &StateKey,
        action: Action,
        reward: f64,
        next: NextState,
        learning_rate: f64,
        discount_factor: f64,
    ) -> f64 {
        let future = match next {
            NextState::Terminal => 0.0,
            NextState::Continue { key, legal_actions } => {
                self.values(&key).max_over(legal_actions)
            }
        };
        let values = &mut self.values[key];
        let old = values.get(action);
        let new = old + learning_rate * (reward + discount_factor * future - old);
        values.set(action, new);
        new
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QLearningConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub epsilon: f64,
    /// Multiplies epsilon on every `decay_epsilon` call.
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
    /// Heat at or beyond which the shoe counts as hot (or cold when negative).
    pub heat_threshold: f64,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            discount_factor: 1.0,
            epsilon: 0.3,
            epsilon_decay: 0.9999,
            min_epsilon: 0.01,
            heat_threshold: 1.0,
        }
    }
}

/// Tabular Q-learning with an epsilon-greedy policy. The exploring draw picks
/// uniformly among all legal actions, greedy one included.
pub struct QLearningAgent {
    config: QLearningConfig,
    table: QTable,
    epsilon: f64,
    learning: bool,
    rng: ChaCha8Rng,
}

impl QLearningAgent {
    pub fn new(config: QLearningConfig, seed: u64) -> Self {
        Self::with_table(config, QTable::new(), seed)
    }

    pub fn with_table(config: QLearningConfig, table: QTable, seed: u64) -> Self {
        Self {
            epsilon: config.epsilon,
            config,
            table,
            learning: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut QTable {
        &mut self.table
    }

    pub fn into_table(self) -> QTable {
        self.table
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);
    }

    /// While off, the agent acts greedily and leaves the table alone.
    pub fn set_learning(&mut self, learning: bool) {
        self.learning = learning;
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    pub fn encode(&self, state: &ObservableState) -> StateKey {
        StateKey::encode(state, self.config.heat_threshold)
    }

    fn current_epsilon(&self) -> f64 {
        if self.learning {
            self.epsilon
        } else {
            0.0
        }
    }

    /// Probability of each legal action under the current policy, in
    /// priority order.
    pub fn action_probabilities(&self, state: &ObservableState) -> Vec<(Action, f64)> {
        let legal = &state.legal_actions;
        let Some(greedy) = self.table.values(&self.encode(state)).greedy(legal) else {
            return Vec::new();
        };
        let epsilon = self.current_epsilon();
        let explore = epsilon / legal.len() as f64;
        legal
            .iter()
            .map(|&action| {
                let exploit = if action == greedy { 1.0 - epsilon } else { 0.0 };
                (action, exploit + explore)
            })
            .collect()
    }
}

impl Agent for QLearningAgent {
    fn name(&self) -> &str {
        "qlearning"
    }

    fn decide(&mut self, state: &ObservableState) -> Result<Action, GameError> {
        let legal = &state.legal_actions;
        let epsilon = self.current_epsilon();
        if epsilon > 0.0 && self.rng.gen::<f64>() < epsilon {
            return Ok(legal.choose(&mut self.rng).copied().unwrap_or(FALLBACK_ACTION));
        }
        let key = self.encode(state);
        Ok(self.table.values(&key).greedy(legal).unwrap_or(FALLBACK_ACTION))
    }

    fn learn(&mut self, state: &ObservableState, action: Action, step: &StepResult) {
        if !self.learning {
            return;
        }
        let key = self.encode(state);
        let next = if step.is_terminal {
            NextState::Terminal
        } else {
            NextState::Continue {
                key: self.encode(&step.next_state),
                legal_actions: &step.next_state.legal_actions,
            }
        };
        let value = self.table.update(
            &key,
            action,
            step.reward,
            next,
            self.config.learning_rate,
            self.config.discount_factor,
        );
        trace!(?key, ?action, reward = step.reward, value, "q update");
    }
}

/// Every encodable state key, handy for dumping a learned policy.
pub fn all_state_keys() -> impl Iterator<Item = StateKey> {
    (4..=StateKey::BUST_TOTAL).flat_map(|player_total| {
        (1..=10u8).flat_map(move |dealer_up_card| {
            [false, true].into_iter().flat_map(move |usable_ace| {
                [HeatBucket::Cold, HeatBucket::Neutral, HeatBucket::Hot]
                    .into_iter()
                    .map(move |heat| StateKey {
                        player_total,
                        dealer_up_card,
                        usable_ace,
                        heat,
                    })
            })
        })
    })
}

/// Greedy action of a stored state among every action, for reporting.
pub fn preferred_action(table: &QTable, key: &StateKey) -> Option<Action> {
    let actions: Vec<Action> = Action::iter().collect();
    table.stored(key).and_then(|values| values.greedy(&actions))
}
