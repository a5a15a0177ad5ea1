//! What an agent is allowed to see of a round, and what it gets back after
//! acting. The dealer's hole card and the order of the shoe are never part of
//! it; deck heat is the only summary of the shoe an agent receives.

use crate::{Action, CardCount, Outcome, Rule};

#[derive(Debug, Clone, PartialEq)]
pub struct ObservableState {
    pub player_total: u16,
    pub player_usable_ace: bool,
    /// Blackjack value of the dealer's up card, Ace being 1.
    pub dealer_up_card: u8,
    pub deck_heat: f64,
    /// Empty once the player can no longer act.
    pub legal_actions: Vec<Action>,
    /// The player's own cards by value.
    pub player_hand: CardCount,
}

impl ObservableState {
    /// Builds the state the player sees while it is their turn.
    pub fn acting(rule: &Rule, player_hand: &CardCount, dealer_up_card: u8, deck_heat: f64) -> Self {
        Self {
            legal_actions: legal_actions(rule, player_hand),
            ..Self::settled(player_hand, dealer_up_card, deck_heat)
        }
    }

    /// Builds the state the player sees once the round is over.
    pub fn settled(player_hand: &CardCount, dealer_up_card: u8, deck_heat: f64) -> Self {
        Self {
            player_total: player_hand.get_actual_sum(),
            player_usable_ace: player_hand.has_usable_ace(),
            dealer_up_card,
            deck_heat,
            legal_actions: Vec::new(),
            player_hand: *player_hand,
        }
    }

    pub fn is_legal(&self, action: Action) -> bool {
        self.legal_actions.contains(&action)
    }
}

/// The table's answer to an applied action.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub next_state: ObservableState,
    /// +1, 0 or -1 when the round ends, 0 before that.
    pub reward: f64,
    pub is_terminal: bool,
    pub outcome: Option<Outcome>,
}

/// Actions the player may take with the given hand, in priority order.
///
/// A bust hand or a hand worth 21 has no action: the turn is over.
pub fn legal_actions(rule: &Rule, player_hand: &CardCount) -> Vec<Action> {
    if player_hand.bust() || player_hand.get_actual_sum() >= 21 {
        return Vec::new();
    }
    let mut actions = vec![Action::Stand, Action::Hit];
    if rule.can_double(player_hand) {
        actions.push(Action::Double);
    }
    actions
}
