//! The agents' own model of a round. Agents never touch the real shoe: they
//! play against a belief of the unseen cards, which is a full shoe of the
//! configured size minus every card they have seen.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::{
    observation::legal_actions, Action, CardCount, GameError, ObservableState, Outcome, Rule,
};

/// Unseen cards, drawn at random in proportion to how many of each value are
/// left. Cloning copies a fixed-size count, so every copy draws on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimShoe {
    unseen: CardCount,
}

impl SimShoe {
    pub fn new(unseen: CardCount) -> Self {
        Self { unseen }
    }

    /// Full shoe minus the player's cards and the dealer's up card.
    pub fn from_observation(rule: &Rule, state: &ObservableState) -> Self {
        let mut unseen = CardCount::with_number_of_decks(rule.number_of_decks);
        unseen.remove_all_present(&state.player_hand);
        if (1..=10).contains(&state.dealer_up_card) {
            unseen.remove_card(state.dealer_up_card);
        }
        Self { unseen }
    }

    /// Removes and returns the value of a random unseen card.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<u8, GameError> {
        let total = self.unseen.get_total();
        if total == 0 {
            return Err(GameError::ShoeExhausted);
        }
        let mut pick = rng.gen_range(0..total);
        for value in 1..=10u8 {
            let count = self.unseen[value];
            if pick < count {
                self.unseen.remove_card(value);
                return Ok(value);
            }
            pick -= count;
        }
        Err(GameError::ShoeExhausted)
    }

    pub fn remaining(&self) -> u16 {
        self.unseen.get_total()
    }

    pub fn card_count(&self) -> &CardCount {
        &self.unseen
    }
}

/// A round as an agent imagines it: its own hand, the dealer's visible cards
/// and a belief shoe. Plain `Copy` data, so a snapshot costs a memcpy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimRound {
    rule: Rule,
    player: CardCount,
    dealer: CardCount,
    shoe: SimShoe,
    doubled: bool,
    outcome: Option<Outcome>,
}

impl SimRound {
    pub fn new(rule: &Rule, player: CardCount, dealer: CardCount, shoe: SimShoe) -> Self {
        Self {
            rule: *rule,
            player,
            dealer,
            shoe,
            doubled: false,
            outcome: None,
        }
    }

    pub fn from_observation(rule: &Rule, state: &ObservableState) -> Self {
        let mut dealer = CardCount::with_number_of_decks(0);
        if (1..=10).contains(&state.dealer_up_card) {
            dealer.add_card(state.dealer_up_card);
        }
        Self::new(
            rule,
            state.player_hand,
            dealer,
            SimShoe::from_observation(rule, state),
        )
    }

    /// Legal actions in priority order; empty once the round is over or the
    /// player's turn has ended.
    pub fn legal_actions(&self) -> Vec<Action> {
        if self.is_terminal() {
            return Vec::new();
        }
        legal_actions(&self.rule, &self.player)
    }

    /// Applies one player action, drawing every card it needs from the belief
    /// shoe. Ends the round when the player busts, stands, doubles or reaches 21.
    pub fn step<R: Rng + ?Sized>(&mut self, action: Action, rng: &mut R) -> Result<(), GameError> {
        let legal = self.legal_actions();
        if !legal.contains(&action) {
            return Err(GameError::InvalidAction { action, legal });
        }

        match action {
            Action::Stand => self.finish(rng)?,
            Action::Hit => {
                let card = self.shoe.draw(rng)?;
                self.player.add_card(card);
                if self.player.bust() {
                    self.outcome = Some(Outcome::Loss);
                } else if self.player.get_actual_sum() == 21 {
                    self.finish(rng)?;
                }
            }
            Action::Double => {
                self.doubled = true;
                let card = self.shoe.draw(rng)?;
                self.player.add_card(card);
                if self.player.bust() {
                    self.outcome = Some(Outcome::Loss);
                } else {
                    self.finish(rng)?;
                }
            }
        }
        Ok(())
    }

    /// Plays uniformly random legal actions until the round ends and returns
    /// the reward.
    pub fn playout<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64, GameError> {
        while !self.is_terminal() {
            let legal = self.legal_actions();
            match legal.choose(rng) {
                Some(&action) => self.step(action, rng)?,
                // Nothing left to decide: the player stands where they are.
                None => self.finish(rng)?,
            }
        }
        Ok(self.reward())
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Reward of the finished round, 0 while it is still running.
    pub fn reward(&self) -> f64 {
        self.outcome.map_or(0.0, Outcome::reward)
    }

    pub fn player(&self) -> &CardCount {
        &self.player
    }

    pub fn dealer(&self) -> &CardCount {
        &self.dealer
    }

    pub fn is_doubled(&self) -> bool {
        self.doubled
    }

    pub fn shoe(&self) -> &SimShoe {
        &self.shoe
    }

    pub fn shoe_mut(&mut self) -> &mut SimShoe {
        &mut self.shoe
    }

    fn finish<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), GameError> {
        while self.dealer.get_total() < 2 || !self.rule.dealer_must_stand(&self.dealer) {
            let card = self.shoe.draw(rng)?;
            self.dealer.add_card(card);
        }
        self.outcome = Some(Outcome::compare(
            self.player.get_actual_sum(),
            self.dealer.get_actual_sum(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state(player: &[u8], dealer_up_card: u8) -> ObservableState {
        let mut hand = CardCount::with_number_of_decks(0);
        for value in player {
            hand.add_card(*value);
        }
        ObservableState::acting(&Rule::default(), &hand, dealer_up_card, 0.0)
    }

    #[test]
    fn belief_shoe_excludes_visible_cards() {
        let rule = Rule::default();
        let shoe = SimShoe::from_observation(&rule, &state(&[10, 6], 6));
        assert_eq!(shoe.remaining(), 6 * 52 - 3);
        assert_eq!(shoe.card_count()[10], 95);
        assert_eq!(shoe.card_count()[6], 22);
    }

    #[test]
    fn draws_follow_the_counts() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut shoe = SimShoe::new(CardCount::new(&[0, 0, 0, 0, 2, 0, 0, 0, 0, 1]));
        let mut drawn = vec![
            shoe.draw(&mut rng).unwrap(),
            shoe.draw(&mut rng).unwrap(),
            shoe.draw(&mut rng).unwrap(),
        ];
        drawn.sort();
        assert_eq!(drawn, vec![5, 5, 10]);
        assert_eq!(shoe.draw(&mut rng), Err(GameError::ShoeExhausted));
    }

    #[test]
    fn stand_against_a_stacked_belief() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let rule = Rule::default();
        let player = CardCount::new(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        let dealer = CardCount::new(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
        let shoe = SimShoe::new(CardCount::new(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 5]));
        let mut round = SimRound::new(&rule, player, dealer, shoe);
        round.step(Action::Stand, &mut rng).unwrap();
        assert_eq!(round.dealer().get_actual_sum(), 26);
        assert_eq!(round.outcome(), Some(Outcome::Win));
        assert!(round.legal_actions().is_empty());
        assert_eq!(
            round.step(Action::Hit, &mut rng),
            Err(GameError::InvalidAction {
                action: Action::Hit,
                legal: vec![]
            })
        );
    }

    #[test]
    fn playout_always_terminates_with_a_valid_reward() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let rule = Rule::default();
        let root = SimRound::from_observation(&rule, &state(&[2, 3], 10));
        for _ in 0..500 {
            let mut round = root;
            let reward = round.playout(&mut rng).unwrap();
            assert!(round.is_terminal());
            assert_eq!(Outcome::from_reward(reward), round.outcome());
        }
        assert!(!root.is_terminal());
        assert_eq!(root.shoe().remaining(), 6 * 52 - 3);
    }

    #[test]
    fn empty_belief_surfaces_as_shoe_exhausted() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let rule = Rule::default();
        let player = CardCount::new(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let dealer = CardCount::new(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
        let empty = SimShoe::new(CardCount::with_number_of_decks(0));
        let mut round = SimRound::new(&rule, player, dealer, empty);
        assert_eq!(round.step(Action::Hit, &mut rng), Err(GameError::ShoeExhausted));
    }
}
