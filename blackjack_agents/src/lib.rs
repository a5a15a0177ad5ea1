pub mod observation;
pub mod simulation;
mod statearray;
pub mod strategy;

use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};
use strum_macros::{EnumCount, EnumIter};
use thiserror::Error;

pub use observation::{ObservableState, StepResult};
pub use simulation::RoundPhase;
pub use statearray::{CardCount, StateArray};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub number_of_decks: u8,
    /// Proportion of the shoe dealt before the cut card is reached.
    pub cut_card_proportion: f64,
    pub dealer_hit_on_soft17: bool,
    pub double_policy: DoublePolicy,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            number_of_decks: 6,
            cut_card_proportion: 0.5,
            dealer_hit_on_soft17: false,
            double_policy: DoublePolicy::Never,
        }
    }
}

impl Rule {
    /// Largest shoe the card tallies can hold.
    pub const MAX_NUMBER_OF_DECKS: u8 = 8;

    /// Returns whether the player may double down on the given hand.
    pub fn can_double(&self, hand: &CardCount) -> bool {
        if hand.get_total() != 2 {
            return false;
        }
        match self.double_policy {
            DoublePolicy::Never => false,
            DoublePolicy::AnyTwo => true,
            DoublePolicy::NineTenElevenOnly => (9..=11).contains(&hand.get_actual_sum()),
            DoublePolicy::TenElevenOnly => (10..=11).contains(&hand.get_actual_sum()),
        }
    }

    /// The dealer hits below 17 and stands above it. A soft 17 is hit only
    /// when the rule says so.
    pub fn dealer_must_stand(&self, dealer: &CardCount) -> bool {
        let actual_sum = dealer.get_actual_sum();
        if actual_sum > 17 {
            true
        } else if actual_sum < 17 {
            false
        } else if !dealer.has_usable_ace() {
            true
        } else {
            !self.dealer_hit_on_soft17
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize_enum_str, Deserialize_enum_str)]
pub enum DoublePolicy {
    Never,
    AnyTwo,
    NineTenElevenOnly,
    TenElevenOnly,
}

/// Player actions. The declaration order is the priority used to break ties
/// between equally valued actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum Action {
    Stand,
    Hit,
    Double,
}

impl Action {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Result of a finished round from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Loss,
    Push,
}

impl Outcome {
    pub fn reward(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Push => 0.0,
            Outcome::Loss => -1.0,
        }
    }

    pub fn from_reward(reward: f64) -> Option<Outcome> {
        if reward == 1.0 {
            Some(Outcome::Win)
        } else if reward == 0.0 {
            Some(Outcome::Push)
        } else if reward == -1.0 {
            Some(Outcome::Loss)
        } else {
            None
        }
    }

    /// Compares two standing totals. The player's bust is checked by the caller
    /// before the dealer plays.
    pub fn compare(player_total: u16, dealer_total: u16) -> Outcome {
        if dealer_total > 21 || player_total > dealer_total {
            Outcome::Win
        } else if player_total < dealer_total {
            Outcome::Loss
        } else {
            Outcome::Push
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("{action:?} is not a legal action here (legal: {legal:?})")]
    InvalidAction { action: Action, legal: Vec<Action> },

    #[error("the shoe has no card left to draw")]
    ShoeExhausted,

    #[error("{operation} is only allowed in {expected:?} phase, but the round is in {actual:?}")]
    WrongPhase {
        operation: &'static str,
        expected: RoundPhase,
        actual: RoundPhase,
    },
}
