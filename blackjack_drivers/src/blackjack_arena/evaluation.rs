use std::collections::BTreeMap;

use blackjack_agents::{
    simulation::{hand::Hand, shoe::Shoe, RoundEventHandler, Table},
    strategy::{
        qlearning::{
            all_state_keys, preferred_action, HeatBucket, QLearningAgent, QTable, StateKey,
        },
        Agent,
    },
    Action, GameError, ObservableState, Outcome, Rule,
};
use tracing::{info, trace, warn};

use self::private::Statistics;

mod private {
    use blackjack_agents::Outcome;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct Statistics {
        wins: u64,
        losses: u64,
        pushes: u64,
        busts: u64,
        decisions: u64,
        abandoned: u64,
    }

    impl Statistics {
        pub fn record(&mut self, outcome: Outcome) {
            match outcome {
                Outcome::Win => self.wins += 1,
                Outcome::Loss => self.losses += 1,
                Outcome::Push => self.pushes += 1,
            }
        }

        pub fn record_bust(&mut self) {
            self.busts += 1;
        }

        pub fn record_decision(&mut self) {
            self.decisions += 1;
        }

        pub fn record_abandoned(&mut self) {
            self.abandoned += 1;
        }

        /// Rounds played to the end.
        pub fn get_rounds(&self) -> u64 {
            self.wins + self.losses + self.pushes
        }

        pub fn get_wins(&self) -> u64 {
            self.wins
        }

        pub fn get_losses(&self) -> u64 {
            self.losses
        }

        pub fn get_pushes(&self) -> u64 {
            self.pushes
        }

        pub fn get_busts(&self) -> u64 {
            self.busts
        }

        pub fn get_decisions(&self) -> u64 {
            self.decisions
        }

        pub fn get_abandoned(&self) -> u64 {
            self.abandoned
        }

        fn rate(&self, count: u64) -> f64 {
            let rounds = self.get_rounds();
            if rounds == 0 {
                0.0
            } else {
                count as f64 / rounds as f64
            }
        }

        pub fn get_win_rate(&self) -> f64 {
            self.rate(self.wins)
        }

        pub fn get_loss_rate(&self) -> f64 {
            self.rate(self.losses)
        }

        pub fn get_push_rate(&self) -> f64 {
            self.rate(self.pushes)
        }

        /// Average reward per finished round.
        pub fn get_mean_reward(&self) -> f64 {
            self.rate(self.wins) - self.rate(self.losses)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Handler {
    round_id: u64,
    cards_in_shoe_before_round: usize,
    heat_before_round: f64,
    stat: Statistics,
}

impl RoundEventHandler for Handler {
    fn on_round_begin(&mut self, shoe: &Shoe) {
        self.round_id += 1;
        self.cards_in_shoe_before_round = shoe.remaining();
        self.heat_before_round = shoe.heat();
    }

    fn on_deal_cards(&mut self, player_hand: &Hand, dealer_up_card: u8) {
        trace!(
            round = self.round_id,
            player = player_hand.value(),
            dealer_up = dealer_up_card,
            "cards dealt"
        );
    }

    fn on_make_decision(&mut self, state: &ObservableState, action: Action) {
        self.stat.record_decision();
        trace!(
            round = self.round_id,
            player = state.player_total,
            soft = state.player_usable_ace,
            ?action,
            "decision"
        );
    }

    fn on_player_bust(&mut self) {
        self.stat.record_bust();
    }

    fn on_summary_round(&mut self, player_hand: &Hand, dealer_hand: &Hand, outcome: Outcome) {
        self.stat.record(outcome);
        trace!(
            round = self.round_id,
            cards_in_shoe = self.cards_in_shoe_before_round,
            heat = self.heat_before_round,
            player = %cards_to_string(player_hand),
            dealer = %cards_to_string(dealer_hand),
            ?outcome,
            "round summary"
        );
    }
}

fn cards_to_string(hand: &Hand) -> String {
    hand.get_cards()
        .iter()
        .map(|card| card.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plays `rounds` rounds on one table. A round that cannot be finished because
/// a shoe ran dry is abandoned and does not count.
fn play_rounds<A, F>(
    rule: &Rule,
    agent: &mut A,
    rounds: u64,
    seed: u64,
    mut after_round: F,
) -> Result<Statistics, GameError>
where
    A: Agent + ?Sized,
    F: FnMut(&mut A, u64, &Statistics),
{
    let mut table = Table::new(rule, seed);
    let mut handler = Handler::default();
    for round in 1..=rounds {
        match table.play_round(agent, &mut handler) {
            Ok(_) => {}
            Err(GameError::ShoeExhausted) => {
                warn!(round, agent = agent.name(), "shoe exhausted mid-round");
                handler.stat.record_abandoned();
                table.abandon_round();
            }
            Err(error) => return Err(error),
        }
        after_round(agent, round, &handler.stat);
    }
    Ok(handler.stat)
}

pub fn evaluate_agent<A: Agent + ?Sized>(
    rule: &Rule,
    agent: &mut A,
    rounds: u64,
    seed: u64,
) -> Result<Statistics, GameError> {
    play_rounds(rule, agent, rounds, seed, |_, _, _| {})
}

/// Trains with exploration on, decaying epsilon after every round, and turns
/// learning off at the end so the agent can be evaluated greedily.
pub fn train_qlearning(
    rule: &Rule,
    agent: &mut QLearningAgent,
    rounds: u64,
    seed: u64,
) -> Result<Statistics, GameError> {
    let progress_interval = (rounds / 10).max(1);
    agent.set_learning(true);
    let stat = play_rounds(rule, agent, rounds, seed, |agent, round, stat| {
        agent.decay_epsilon();
        if round % progress_interval == 0 {
            info!(
                round,
                epsilon = agent.epsilon(),
                states = agent.table().len(),
                win_rate = stat.get_win_rate(),
                "training progress"
            );
        }
    })?;
    agent.set_learning(false);
    Ok(stat)
}

pub fn print_summary(name: &str, stat: &Statistics) {
    println!(
        "{:<10} rounds: {:>6}  win: {:>6.2}%  loss: {:>6.2}%  push: {:>6.2}%  mean reward: {:+.4}",
        name,
        stat.get_rounds(),
        stat.get_win_rate() * 100.0,
        stat.get_loss_rate() * 100.0,
        stat.get_push_rate() * 100.0,
        stat.get_mean_reward(),
    );
    println!(
        "{:<10} W/L/P: {}/{}/{}  busts: {}  decisions: {}",
        "",
        stat.get_wins(),
        stat.get_losses(),
        stat.get_pushes(),
        stat.get_busts(),
        stat.get_decisions(),
    );
    if stat.get_abandoned() > 0 {
        println!("{:<10} abandoned rounds: {}", "", stat.get_abandoned());
    }
}

fn action_letter(action: Option<Action>) -> char {
    match action {
        Some(Action::Stand) => 'S',
        Some(Action::Hit) => 'H',
        Some(Action::Double) => 'D',
        None => '.',
    }
}

/// Learned greedy action per state as text rows, one row per heat level, hand
/// softness and player total, with one column per dealer up card (A, 2..10).
/// Groups where nothing was learned are left out.
fn policy_rows(table: &QTable) -> Vec<String> {
    let mut grid: BTreeMap<(u8, bool, u8), [char; 10]> = BTreeMap::new();
    for key in all_state_keys().filter(|key| key.player_total < StateKey::BUST_TOTAL) {
        let heat = match key.heat {
            HeatBucket::Cold => 0,
            HeatBucket::Neutral => 1,
            HeatBucket::Hot => 2,
        };
        let row = grid
            .entry((heat, key.usable_ace, key.player_total))
            .or_insert(['.'; 10]);
        row[key.dealer_up_card as usize - 1] = action_letter(preferred_action(table, &key));
    }

    let mut rows = Vec::new();
    let mut current_group = None;
    for ((heat, soft, total), row) in grid {
        if row.iter().all(|letter| *letter == '.') {
            continue;
        }
        if current_group != Some((heat, soft)) {
            current_group = Some((heat, soft));
            let heat_name = ["cold", "neutral", "hot"][heat as usize];
            let hand_kind = if soft { "soft" } else { "hard" };
            let group = format!("{} {}", heat_name, hand_kind);
            rows.push(format!("{:<12} |  A 2 3 4 5 6 7 8 9 T", group));
        }
        let cells: String = row.iter().flat_map(|letter| [' ', *letter]).collect();
        rows.push(format!("{:>12} | {}", total, cells));
    }
    rows
}

pub fn print_policy(agent: &QLearningAgent) {
    println!("{} policy (S stand, H hit, D double, . unseen)", agent.name());
    for row in policy_rows(agent.table()) {
        println!("{}", row);
    }
}
