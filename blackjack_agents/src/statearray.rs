use std::collections::HashMap;
use std::hash::Hash;
use std::ops::{Index, IndexMut};

/// This struct provides a convenient way to use a hashable state as the index
/// of an array. Indexing mutably with an unseen state inserts `T::default()`,
/// so every state reads as its default value until it is first written.
#[derive(Debug, Clone)]
pub struct StateArray<K: Hash + Eq, T: Default> {
    data: HashMap<K, T>,
}

impl<K: Hash + Eq, T: Default> StateArray<K, T> {
    pub fn new() -> StateArray<K, T> {
        StateArray {
            data: HashMap::new(),
        }
    }

    pub fn contains_state(&self, index: &K) -> bool {
        self.data.contains_key(index)
    }

    pub fn get(&self, index: &K) -> Option<&T> {
        self.data.get(index)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.data.iter()
    }
}

impl<K: Hash + Eq, T: Default> Default for StateArray<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Panics if the state was never written. Use `get` when absence is expected.
impl<K: Hash + Eq, T: Default> Index<&K> for StateArray<K, T> {
    type Output = T;
    fn index(&self, index: &K) -> &Self::Output {
        &self.data[index]
    }
}

impl<K: Hash + Eq + Clone, T: Default> IndexMut<&K> for StateArray<K, T> {
    fn index_mut(&mut self, index: &K) -> &mut Self::Output {
        self.data.entry(index.clone()).or_default()
    }
}

/// This provides a container to store the numbers of each card value (from
/// 1 to 10 inclusive). Ace is stored as 1 and every ten-valued card as 10.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CardCount {
    counts: [u16; 10],
    sum: u16,
    total: u16,
}

impl CardCount {
    pub fn new(counts: &[u16; 10]) -> CardCount {
        let mut card_count = CardCount {
            counts: *counts,
            sum: 0,
            total: 0,
        };

        card_count.propagate_counts();

        card_count
    }

    pub fn with_number_of_decks(number_of_decks: u8) -> CardCount {
        let mut counts = [number_of_decks as u16 * 4; 10];
        counts[9] = number_of_decks as u16 * 16;
        Self::new(&counts)
    }

    /// Add a card of given card value.
    ///
    /// Note that this method won't check if the card value is valid.
    pub fn add_card(&mut self, card_value: u8) {
        let index = (card_value - 1) as usize;
        self.counts[index] += 1;
        self.sum += card_value as u16;
        self.total += 1;
    }

    /// Remove a card of given card value. Returns false and leaves the count
    /// untouched if there is no such card.
    pub fn remove_card(&mut self, card_value: u8) -> bool {
        let index = (card_value - 1) as usize;
        if self.counts[index] == 0 {
            return false;
        }
        self.counts[index] -= 1;
        self.sum -= card_value as u16;
        self.total -= 1;
        true
    }

    /// Removes every card of `other` that is present here, ignoring the rest.
    pub fn remove_all_present(&mut self, other: &CardCount) {
        for value in 1..=10u8 {
            for _ in 0..other[value] {
                if !self.remove_card(value) {
                    break;
                }
            }
        }
    }

    /// Note that this method treats Ace as 1.
    pub fn get_sum(&self) -> u16 {
        self.sum
    }

    /// Number of cards.
    pub fn get_total(&self) -> u16 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns whether there is at least one Ace.
    pub fn is_soft(&self) -> bool {
        self.counts[0] > 0
    }

    /// Returns whether an Ace currently counts as 11 without busting.
    pub fn has_usable_ace(&self) -> bool {
        self.is_soft() && self.sum + 10 <= 21
    }

    pub fn bust(&self) -> bool {
        self.sum > 21
    }

    pub fn is_natural(&self) -> bool {
        self.total == 2 && self.counts[0] == 1 && self.counts[9] == 1
    }

    /// The best score of the cards: one Ace counts as 11 if that does not bust.
    pub fn get_actual_sum(&self) -> u16 {
        if self.has_usable_ace() {
            self.sum + 10
        } else {
            self.sum
        }
    }

    pub fn counts(&self) -> &[u16; 10] {
        &self.counts
    }

    fn propagate_counts(&mut self) {
        self.sum = 0;
        self.total = 0;
        for i in 0..self.counts.len() {
            self.sum += ((i + 1) as u16) * self.counts[i];
            self.total += self.counts[i];
        }
    }
}

impl Index<u8> for CardCount {
    type Output = u16;
    fn index(&self, index: u8) -> &Self::Output {
        &self.counts[(index - 1) as usize]
    }
}
