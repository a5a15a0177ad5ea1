use crate::CardCount;

use super::Card;

/// Represents the cards held by the player or the dealer in one round.
///
/// The value is always derived from the card count, which is updated by the
/// same call that receives a card.
#[derive(Debug, Clone)]
pub struct Hand {
    cards: Vec<Card>,
    card_count: CardCount,
}

impl Hand {
    pub fn new() -> Hand {
        Hand {
            cards: Vec::with_capacity(4),
            card_count: CardCount::with_number_of_decks(0),
        }
    }

    pub fn receive_card(&mut self, card: Card) {
        self.cards.push(card);
        self.card_count.add_card(card.blackjack_value());
    }

    pub fn get_cards(&self) -> &Vec<Card> {
        &self.cards
    }

    pub fn get_card_count(&self) -> &CardCount {
        &self.card_count
    }

    /// Best score under the usable-ace rule.
    pub fn value(&self) -> u16 {
        self.card_count.get_actual_sum()
    }

    pub fn has_usable_ace(&self) -> bool {
        self.card_count.has_usable_ace()
    }

    pub fn bust(&self) -> bool {
        self.card_count.bust()
    }

    pub fn clear(&mut self) {
        self.cards.clear();
        self.card_count = CardCount::with_number_of_decks(0);
    }
}

impl Default for Hand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::Suit;

    use super::*;

    #[test]
    fn soft_hand_turns_hard_when_ace_must_count_one() {
        let mut hand = Hand::new();
        hand.receive_card(Card::new(1, Suit::Diamond));
        hand.receive_card(Card::new(6, Suit::Club));
        assert_eq!(hand.value(), 17);
        assert!(hand.has_usable_ace());

        hand.receive_card(Card::new(9, Suit::Heart));
        assert_eq!(hand.value(), 16);
        assert!(!hand.has_usable_ace());
        assert_eq!(hand.get_cards().len(), 3);
    }

    #[test]
    fn face_cards_count_ten_and_clear_empties() {
        let mut hand = Hand::new();
        hand.receive_card(Card::new(13, Suit::Spade));
        hand.receive_card(Card::new(11, Suit::Heart));
        hand.receive_card(Card::new(2, Suit::Heart));
        assert_eq!(hand.value(), 22);
        assert!(hand.bust());

        hand.clear();
        assert_eq!(hand.value(), 0);
        assert!(hand.get_cards().is_empty());
    }
}
