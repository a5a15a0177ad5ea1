pub mod hand;
pub mod shoe;

use crate::{
    observation::legal_actions, strategy::Agent, Action, GameError, ObservableState, Outcome,
    Rule, StepResult,
};
use blackjack_macros::allowed_phase;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strum_macros::EnumIter;
use tracing::{debug, trace, warn};

use self::{hand::Hand, shoe::Shoe};

static FACE_VALUE_TO_BLACKJACK_VALUE: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 10, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Suit {
    Diamond = 0,
    Club,
    Heart,
    Spade,
}

/// Represents a card in the real world with a suit and a face value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub face_value: u8,
    pub suit: Suit,
}

impl Card {
    /// Face value runs from 1 (Ace) to 13 (King).
    pub fn new(face_value: u8, suit: Suit) -> Card {
        Card { face_value, suit }
    }

    pub fn blackjack_value(&self) -> u8 {
        FACE_VALUE_TO_BLACKJACK_VALUE[(self.face_value - 1) as usize]
    }

    /// Contribution of this card to the deck heat once dealt: high cards
    /// (tens and Aces) +1, low cards (2 to 6) -1, the rest 0.
    pub fn heat(&self) -> i32 {
        match self.blackjack_value() {
            1 | 10 => 1,
            2..=6 => -1,
            _ => 0,
        }
    }
}

impl Default for Card {
    fn default() -> Self {
        Card {
            face_value: 1,
            suit: Suit::Diamond,
        }
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suit = match self.suit {
            Suit::Diamond => 'D',
            Suit::Club => 'C',
            Suit::Heart => 'H',
            Suit::Spade => 'S',
        };
        let value = match self.face_value {
            1 => 'A',
            2..=9 => (b'0' + self.face_value) as char,
            10 => 'T',
            11 => 'J',
            12 => 'Q',
            13 => 'K',
            _ => '?',
        };
        write!(f, "{}{}", suit, value)
    }
}

impl From<Card> for u8 {
    fn from(card: Card) -> u8 {
        card.suit as u8 * 13 + card.face_value - 1
    }
}

impl TryFrom<u8> for Card {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let suit = match value / 13 {
            0 => Suit::Diamond,
            1 => Suit::Club,
            2 => Suit::Heart,
            3 => Suit::Spade,
            _ => return Err(()),
        };
        Ok(Card {
            suit,
            face_value: value % 13 + 1,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    WaitForDeal,
    PlayerTurn,
    Settled,
}

/// Simulates a Blackjack table with one player seat. Some differences from a
/// casino table:
/// 1. The dealer's second card is dealt only after the player's turn, and not
///    at all when the player busts, so there is no peek and no insurance.
/// 2. A natural pays like any other win.
/// 3. A player reaching 21 stands automatically.
pub struct Table {
    rule: Rule,
    rng: ChaCha8Rng,

    // Round state
    current_phase: RoundPhase,
    shoe: Shoe,
    player_hand: Hand,
    dealer_hand: Hand,
    doubled: bool,
    outcome: Option<Outcome>,
}

impl Table {
    pub fn new(rule: &Rule, seed: u64) -> Self {
        let shoe = Shoe::new(rule.number_of_decks, rule.cut_card_proportion);
        let mut table = Self::with_shoe(rule, shoe, seed);
        table.shoe.shuffle(&mut table.rng);
        table
    }

    /// Uses the shoe as it is, without shuffling it first.
    pub fn with_shoe(rule: &Rule, shoe: Shoe, seed: u64) -> Self {
        Self {
            rule: *rule,
            rng: ChaCha8Rng::seed_from_u64(seed),
            current_phase: RoundPhase::WaitForDeal,
            shoe,
            player_hand: Hand::new(),
            dealer_hand: Hand::new(),
            doubled: false,
            outcome: None,
        }
    }

    /// Plays one full round with the given agent: deal, let the agent act until
    /// its turn is over, settle, and start a new shoe if the cut card has been
    /// reached. Can be called at WaitForDeal phase.
    pub fn play_round<A: Agent + ?Sized, H: RoundEventHandler>(
        &mut self,
        agent: &mut A,
        handler: &mut H,
    ) -> Result<Outcome, GameError> {
        handler.on_round_begin(&self.shoe);
        self.deal_initial_cards()?;
        handler.on_deal_cards(&self.player_hand, self.dealer_up_card());

        while self.current_phase == RoundPhase::PlayerTurn {
            let state = self.observe_state()?;
            let action = agent.decide(&state)?;
            handler.on_make_decision(&state, action);
            let step = self.apply_action(action)?;
            if self.player_hand.bust() {
                handler.on_player_bust();
            }
            agent.learn(&state, action, &step);
        }

        let outcome = self.outcome.ok_or(GameError::WrongPhase {
            operation: "play_round",
            expected: RoundPhase::Settled,
            actual: self.current_phase,
        })?;
        handler.on_summary_round(&self.player_hand, &self.dealer_hand, outcome);
        self.end_round()?;
        Ok(outcome)
    }

    /// Can be called at WaitForDeal phase.
    /// Deals two cards to the player and the up card to the dealer.
    #[allowed_phase(WaitForDeal)]
    pub fn deal_initial_cards(&mut self) -> Result<(), GameError> {
        self.new_round();
        for _ in 0..2 {
            let card = self.shoe.deal_card()?;
            self.player_hand.receive_card(card);
        }
        let card = self.shoe.deal_card()?;
        self.dealer_hand.receive_card(card);

        self.current_phase = RoundPhase::PlayerTurn;
        trace!(
            player = self.player_hand.value(),
            dealer_up = self.dealer_up_card(),
            "initial cards dealt"
        );
        if self.player_hand.value() == 21 {
            self.finish_player_turn()?;
        }
        Ok(())
    }

    /// Can be called at PlayerTurn phase.
    #[allowed_phase(PlayerTurn)]
    pub fn observe_state(&self) -> Result<ObservableState, GameError> {
        Ok(ObservableState::acting(
            &self.rule,
            self.player_hand.get_card_count(),
            self.dealer_up_card(),
            self.shoe.heat(),
        ))
    }

    /// Can be called at PlayerTurn phase.
    /// An illegal action is rejected before anything changes.
    #[allowed_phase(PlayerTurn)]
    pub fn apply_action(&mut self, action: Action) -> Result<StepResult, GameError> {
        let legal = legal_actions(&self.rule, self.player_hand.get_card_count());
        if !legal.contains(&action) {
            return Err(GameError::InvalidAction { action, legal });
        }

        match action {
            Action::Stand => self.finish_player_turn()?,
            Action::Hit => {
                self.deal_to_player()?;
                if self.player_hand.bust() {
                    self.settle(Outcome::Loss);
                } else if self.player_hand.value() == 21 {
                    self.finish_player_turn()?;
                }
            }
            Action::Double => {
                self.doubled = true;
                self.deal_to_player()?;
                if self.player_hand.bust() {
                    self.settle(Outcome::Loss);
                } else {
                    self.finish_player_turn()?;
                }
            }
        }

        Ok(self.step_result())
    }

    /// Can be called at Settled phase.
    /// Starts a new shoe if the cut card has been reached.
    #[allowed_phase(Settled)]
    pub fn end_round(&mut self) -> Result<(), GameError> {
        if self.shoe.reached_cut_card() {
            debug!(remaining = self.shoe.remaining(), "cut card reached, reshuffling");
            self.shoe.shuffle(&mut self.rng);
        }
        self.current_phase = RoundPhase::WaitForDeal;
        Ok(())
    }

    /// Drops the current round whatever its phase and reshuffles. Used after a
    /// round could not be finished, e.g. the shoe ran out mid-round.
    pub fn abandon_round(&mut self) {
        warn!(phase = ?self.current_phase, "abandoning round and reshuffling");
        self.new_round();
        self.shoe.shuffle(&mut self.rng);
        self.current_phase = RoundPhase::WaitForDeal;
    }

    pub fn current_phase(&self) -> RoundPhase {
        self.current_phase
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn shoe(&self) -> &Shoe {
        &self.shoe
    }

    pub fn player_hand(&self) -> &Hand {
        &self.player_hand
    }

    pub fn dealer_hand(&self) -> &Hand {
        &self.dealer_hand
    }

    pub fn is_doubled(&self) -> bool {
        self.doubled
    }

    /// The outcome of the round, once it is settled.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    fn dealer_up_card(&self) -> u8 {
        self.dealer_hand
            .get_cards()
            .first()
            .map(Card::blackjack_value)
            .unwrap_or_default()
    }

    fn deal_to_player(&mut self) -> Result<(), GameError> {
        let card = self.shoe.deal_card()?;
        self.player_hand.receive_card(card);
        Ok(())
    }

    /// Deals the hole card and lets the dealer play to the rule, then settles.
    fn finish_player_turn(&mut self) -> Result<(), GameError> {
        loop {
            let dealer_card_count = self.dealer_hand.get_card_count();
            if dealer_card_count.get_total() >= 2 && self.rule.dealer_must_stand(dealer_card_count)
            {
                break;
            }
            let card = self.shoe.deal_card()?;
            self.dealer_hand.receive_card(card);
        }

        let outcome = Outcome::compare(self.player_hand.value(), self.dealer_hand.value());
        self.settle(outcome);
        Ok(())
    }

    fn settle(&mut self, outcome: Outcome) {
        trace!(
            ?outcome,
            player = self.player_hand.value(),
            dealer = self.dealer_hand.value(),
            doubled = self.doubled,
            "round settled"
        );
        self.outcome = Some(outcome);
        self.current_phase = RoundPhase::Settled;
    }

    fn step_result(&self) -> StepResult {
        let player_card_count = self.player_hand.get_card_count();
        let heat = self.shoe.heat();
        match self.outcome {
            Some(outcome) => StepResult {
                next_state: ObservableState::settled(player_card_count, self.dealer_up_card(), heat),
                reward: outcome.reward(),
                is_terminal: true,
                outcome: Some(outcome),
            },
            None => StepResult {
                next_state: ObservableState::acting(
                    &self.rule,
                    player_card_count,
                    self.dealer_up_card(),
                    heat,
                ),
                reward: 0.0,
                is_terminal: false,
                outcome: None,
            },
        }
    }

    fn new_round(&mut self) {
        self.player_hand.clear();
        self.dealer_hand.clear();
        self.doubled = false;
        self.outcome = None;
    }
}

/// Callbacks fired by `Table::play_round`.
pub trait RoundEventHandler {
    fn on_round_begin(&mut self, shoe: &Shoe);
    fn on_deal_cards(&mut self, player_hand: &Hand, dealer_up_card: u8);
    fn on_make_decision(&mut self, state: &ObservableState, action: Action);
    fn on_player_bust(&mut self);
    fn on_summary_round(&mut self, player_hand: &Hand, dealer_hand: &Hand, outcome: Outcome);
}

/// Ignores every event.
impl RoundEventHandler for () {
    fn on_round_begin(&mut self, _: &Shoe) {}
    fn on_deal_cards(&mut self, _: &Hand, _: u8) {}
    fn on_make_decision(&mut self, _: &ObservableState, _: Action) {}
    fn on_player_bust(&mut self) {}
    fn on_summary_round(&mut self, _: &Hand, _: &Hand, _: Outcome) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ThresholdAgent;
    use crate::DoublePolicy;

    fn stacked_table(values: &[u8]) -> Table {
        let cards = values
            .iter()
            .map(|value| Card::new(*value, Suit::Club))
            .collect();
        Table::with_shoe(&Rule::default(), Shoe::stacked(cards), 0)
    }

    #[test]
    fn test_allowed_phase() {
        let mut table = stacked_table(&[10, 6, 6, 10, 9]);
        assert_eq!(table.current_phase(), RoundPhase::WaitForDeal);
        assert_eq!(
            table.apply_action(Action::Hit),
            Err(GameError::WrongPhase {
                operation: "apply_action",
                expected: RoundPhase::PlayerTurn,
                actual: RoundPhase::WaitForDeal,
            })
        );
        assert!(table.deal_initial_cards().is_ok());
        assert_eq!(table.current_phase(), RoundPhase::PlayerTurn);
        assert!(table.deal_initial_cards().is_err());
        assert!(table.end_round().is_err());
    }

    #[test]
    fn observation_hides_hole_card_and_shoe() {
        let mut table = stacked_table(&[10, 6, 6, 10, 9]);
        table.deal_initial_cards().unwrap();
        let state = table.observe_state().unwrap();
        assert_eq!(state.player_total, 16);
        assert!(!state.player_usable_ace);
        assert_eq!(state.dealer_up_card, 6);
        assert_eq!(state.legal_actions, vec![Action::Stand, Action::Hit]);
        assert_eq!(table.dealer_hand().get_cards().len(), 1);
    }

    #[test]
    fn stand_lets_dealer_draw_to_seventeen() {
        // Player 10,6; dealer 6, then hole 10 and a 9: dealer busts with 25.
        let mut table = stacked_table(&[10, 6, 6, 10, 9]);
        table.deal_initial_cards().unwrap();
        let step = table.apply_action(Action::Stand).unwrap();
        assert!(step.is_terminal);
        assert_eq!(step.outcome, Some(Outcome::Win));
        assert_eq!(step.reward, 1.0);
        assert!(step.next_state.legal_actions.is_empty());
        assert_eq!(table.dealer_hand().value(), 25);
        assert_eq!(table.current_phase(), RoundPhase::Settled);
    }

    #[test]
    fn hit_to_bust_loses_without_dealer_drawing() {
        let mut table = stacked_table(&[10, 6, 6, 10]);
        table.deal_initial_cards().unwrap();
        let step = table.apply_action(Action::Hit).unwrap();
        assert_eq!(step.outcome, Some(Outcome::Loss));
        assert_eq!(step.reward, -1.0);
        assert_eq!(table.dealer_hand().get_cards().len(), 1);
    }

    #[test]
    fn hit_without_bust_keeps_turn_open() {
        let mut table = stacked_table(&[10, 2, 6, 3]);
        table.deal_initial_cards().unwrap();
        let step = table.apply_action(Action::Hit).unwrap();
        assert!(!step.is_terminal);
        assert_eq!(step.reward, 0.0);
        assert_eq!(step.next_state.player_total, 15);
        assert_eq!(step.next_state.legal_actions, vec![Action::Stand, Action::Hit]);
        assert_eq!(table.current_phase(), RoundPhase::PlayerTurn);
    }

    #[test]
    fn invalid_action_changes_nothing() {
        let mut table = stacked_table(&[10, 6, 6, 10, 9]);
        table.deal_initial_cards().unwrap();
        let before = table.observe_state().unwrap();
        let result = table.apply_action(Action::Double);
        assert_eq!(
            result,
            Err(GameError::InvalidAction {
                action: Action::Double,
                legal: vec![Action::Stand, Action::Hit],
            })
        );
        assert_eq!(table.observe_state().unwrap(), before);
        assert_eq!(table.shoe().remaining(), 2);
    }

    #[test]
    fn double_takes_exactly_one_card() {
        let rule = Rule {
            double_policy: DoublePolicy::AnyTwo,
            ..Default::default()
        };
        let cards = [5, 6, 9, 10, 10, 10]
            .iter()
            .map(|value| Card::new(*value, Suit::Heart))
            .collect();
        let mut table = Table::with_shoe(&rule, Shoe::stacked(cards), 0);
        table.deal_initial_cards().unwrap();
        let step = table.apply_action(Action::Double).unwrap();
        assert!(table.is_doubled());
        assert_eq!(table.player_hand().value(), 21);
        assert_eq!(table.dealer_hand().value(), 19);
        assert_eq!(step.outcome, Some(Outcome::Win));
    }

    #[test]
    fn player_twenty_one_stands_automatically() {
        let mut table = stacked_table(&[1, 13, 9, 9]);
        table.deal_initial_cards().unwrap();
        assert_eq!(table.current_phase(), RoundPhase::Settled);
        assert_eq!(table.outcome(), Some(Outcome::Win));
    }

    #[test]
    fn push_on_equal_totals() {
        let mut table = stacked_table(&[10, 8, 10, 8]);
        table.deal_initial_cards().unwrap();
        let step = table.apply_action(Action::Stand).unwrap();
        assert_eq!(step.outcome, Some(Outcome::Push));
        assert_eq!(step.reward, 0.0);
    }

    #[test]
    fn empty_shoe_surfaces_as_shoe_exhausted() {
        let mut table = stacked_table(&[10, 6, 6]);
        table.deal_initial_cards().unwrap();
        assert_eq!(table.apply_action(Action::Hit), Err(GameError::ShoeExhausted));
        table.abandon_round();
        assert_eq!(table.current_phase(), RoundPhase::WaitForDeal);
        assert_eq!(table.shoe().remaining(), 3);
    }

    #[test]
    fn play_round_settles_and_reshuffles_at_cut_card() {
        let rule = Rule {
            number_of_decks: 1,
            cut_card_proportion: 0.25,
            ..Default::default()
        };
        let mut table = Table::new(&rule, 42);
        let mut agent = ThresholdAgent::new(17);
        let mut reshuffled = false;
        for _ in 0..40 {
            let before = table.shoe().remaining();
            let outcome = table.play_round(&mut agent, &mut ()).unwrap();
            assert!(matches!(outcome, Outcome::Win | Outcome::Loss | Outcome::Push));
            assert_eq!(table.current_phase(), RoundPhase::WaitForDeal);
            if table.shoe().remaining() > before {
                reshuffled = true;
                assert_eq!(table.shoe().running_heat(), 0);
            }
        }
        assert!(reshuffled);
    }

    #[test]
    fn card_display_and_integer_conversion() {
        let card = Card::new(12, Suit::Heart);
        assert_eq!(card.to_string(), "HQ");
        assert_eq!(Card::new(7, Suit::Club).to_string(), "C7");
        let integer: u8 = card.into();
        assert_eq!(Card::try_from(integer), Ok(card));
        assert!(Card::try_from(52).is_err());
    }
}
