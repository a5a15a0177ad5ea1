use std::sync::Arc;

use crate::{CardCount, GameError};

use super::{Card, Suit};

use rand::seq::SliceRandom;
use rand::Rng;
use strum::IntoEnumIterator;

/// Represents a shoe in the real world.
///
/// The shuffled cards live in an immutable array shared between clones; a shoe
/// only owns its draw position, so cloning one is a few integer copies.
#[derive(Debug, Clone)]
pub struct Shoe {
    cut_card_index: usize,
    cards: Arc<[Card]>,
    card_count: CardCount,
    current_index: usize,
    running_heat: i32,
}

impl Shoe {
    /// Creates a new shoe with ordered cards.
    pub fn new(number_of_decks: u8, cut_card_proportion: f64) -> Shoe {
        let mut cards = Vec::with_capacity(number_of_decks as usize * 52);
        for _ in 0..number_of_decks {
            for suit in Suit::iter() {
                for face_value in 1..=13 {
                    cards.push(Card { face_value, suit });
                }
            }
        }
        Shoe {
            cut_card_index: (cut_card_proportion * (number_of_decks as u16 * 52) as f64) as usize,
            cards: cards.into(),
            card_count: CardCount::with_number_of_decks(number_of_decks),
            current_index: 0,
            running_heat: 0,
        }
    }

    /// Creates a shoe that deals the given cards in order and never reaches the
    /// cut card.
    pub fn stacked(cards: Vec<Card>) -> Shoe {
        let mut card_count = CardCount::with_number_of_decks(0);
        for card in &cards {
            card_count.add_card(card.blackjack_value());
        }
        Shoe {
            cut_card_index: cards.len(),
            cards: cards.into(),
            card_count,
            current_index: 0,
            running_heat: 0,
        }
    }

    /// Returns all the dealt cards back into the shoe and shuffles.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut cards = self.cards.to_vec();
        cards.shuffle(rng);
        self.cards = cards.into();
        self.retry();
    }

    /// Returns the dealt cards back into the shoe in the original order.
    pub fn retry(&mut self) {
        self.current_index = 0;
        self.running_heat = 0;
        self.card_count = CardCount::with_number_of_decks(0);
        for card in self.cards.iter() {
            self.card_count.add_card(card.blackjack_value());
        }
    }

    /// Deals the next card, or `ShoeExhausted` if every card has been dealt.
    pub fn deal_card(&mut self) -> Result<Card, GameError> {
        let card = *self
            .cards
            .get(self.current_index)
            .ok_or(GameError::ShoeExhausted)?;
        self.current_index += 1;
        self.card_count.remove_card(card.blackjack_value());
        self.running_heat += card.heat();
        Ok(card)
    }

    /// Checks if the cut card has been reached.
    pub fn reached_cut_card(&self) -> bool {
        self.current_index >= self.cut_card_index
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.current_index
    }

    pub fn get_card_count(&self) -> &CardCount {
        &self.card_count
    }

    /// Sum of `Card::heat` over every card dealt since the last shuffle.
    pub fn running_heat(&self) -> i32 {
        self.running_heat
    }

    /// Running heat divided by the number of decks left in the shoe.
    pub fn heat(&self) -> f64 {
        let decks_remaining = (self.remaining() as f64 / 52.0).max(1.0 / 52.0);
        self.running_heat as f64 / decks_remaining
    }

    pub fn preview_next_few_cards(&self, number: usize) -> &[Card] {
        let end = (self.current_index + number).min(self.cards.len());
        &self.cards[self.current_index..end]
    }
}
