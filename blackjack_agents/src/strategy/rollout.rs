use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use strum::EnumCount;
use tracing::debug;

use super::{best_by_priority, simulated::SimRound, Agent, SearchBudget, FALLBACK_ACTION};
use crate::{Action, GameError, ObservableState, Rule};

/// Running statistics of the rewards observed for one action.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionStats {
    pub n: u64,
    pub sum_x: f64,
    pub sum_x_squared: f64,
}

impl ActionStats {
    pub fn update(&mut self, reward: f64) {
        self.n += 1;
        self.sum_x += reward;
        self.sum_x_squared += reward * reward;
    }

    /// Mean reward, or negative infinity before the first sample.
    pub fn ev(&self) -> f64 {
        if self.n == 0 {
            f64::NEG_INFINITY
        } else {
            self.sum_x / self.n as f64
        }
    }

    /// Standard error of the mean.
    pub fn sem(&self) -> f64 {
        if self.n < 2 {
            f64::INFINITY
        } else {
            let mean = self.sum_x / self.n as f64;
            let variance = (self.sum_x_squared / self.n as f64) - (mean * mean);
            (variance.max(0.0) / self.n as f64).sqrt()
        }
    }

    pub fn merge(&mut self, other: &ActionStats) {
        self.n += other.n;
        self.sum_x += other.sum_x;
        self.sum_x_squared += other.sum_x_squared;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutConfig {
    /// Iterations count playouts per action.
    pub budget: SearchBudget,
    /// Runs the playouts of each action on its own rayon worker.
    pub parallel: bool,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            budget: SearchBudget::IterationsWithin {
                iterations: 200,
                time: Duration::from_millis(5),
            },
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RolloutReport {
    pub action: Action,
    /// Indexed by `Action::index`.
    pub stats: [ActionStats; Action::COUNT],
}

impl RolloutReport {
    pub fn playouts(&self) -> u64 {
        self.stats.iter().map(|stats| stats.n).sum()
    }
}

/// Flat Monte Carlo: plays random rounds after each legal action and takes the
/// action with the best average reward.
///
/// Actions are sampled round-robin and the budget is checked before every
/// playout, so when time runs out the sample sizes may differ by one between
/// actions. The estimate of the later actions is then slightly noisier.
pub struct RolloutAgent {
    rule: Rule,
    config: RolloutConfig,
    rng: ChaCha8Rng,
}

impl RolloutAgent {
    pub fn new(rule: &Rule, config: RolloutConfig, seed: u64) -> Self {
        Self {
            rule: *rule,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    pub fn evaluate(&mut self, state: &ObservableState) -> Result<RolloutReport, GameError> {
        let mut stats = [ActionStats::default(); Action::COUNT];
        if self.config.budget.is_zero() || state.legal_actions.is_empty() {
            return Ok(RolloutReport {
                action: FALLBACK_ACTION,
                stats,
            });
        }

        let root = SimRound::from_observation(&self.rule, state);
        if self.config.parallel {
            let seeds: Vec<u64> = state.legal_actions.iter().map(|_| self.rng.gen()).collect();
            let budget = self.config.budget;
            let per_action = state
                .legal_actions
                .par_iter()
                .zip(seeds)
                .map(|(&action, seed)| -> Result<(Action, ActionStats), GameError> {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    let clock = budget.start();
                    let mut action_stats = ActionStats::default();
                    let mut completed = 0;
                    while clock.allows(completed) {
                        action_stats.update(playout_after(root, action, &mut rng)?);
                        completed += 1;
                    }
                    Ok((action, action_stats))
                })
                .collect::<Result<Vec<_>, GameError>>()?;
            for (action, action_stats) in per_action {
                stats[action.index()].merge(&action_stats);
            }
        } else {
            let clock = self.config.budget.start();
            let mut rounds = 0;
            'sampling: while clock.allows(rounds) {
                for &action in &state.legal_actions {
                    if clock.time_expired() {
                        break 'sampling;
                    }
                    stats[action.index()].update(playout_after(root, action, &mut self.rng)?);
                }
                rounds += 1;
            }
        }

        let action = best_by_priority(&state.legal_actions, |action| {
            let action_stats = &stats[action.index()];
            (action_stats.n > 0).then(|| action_stats.ev())
        })
        .unwrap_or(FALLBACK_ACTION);

        Ok(RolloutReport { action, stats })
    }
}

fn playout_after<R: Rng + ?Sized>(
    root: SimRound,
    action: Action,
    rng: &mut R,
) -> Result<f64, GameError> {
    let mut round = root;
    round.step(action, rng)?;
    round.playout(rng)
}

impl Agent for RolloutAgent {
    fn name(&self) -> &str {
        "rollout"
    }

    fn decide(&mut self, state: &ObservableState) -> Result<Action, GameError> {
        let report = self.evaluate(state)?;
        debug!(
            player = state.player_total,
            dealer_up = state.dealer_up_card,
            action = ?report.action,
            playouts = report.playouts(),
            "rollout decision"
        );
        Ok(report.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CardCount;

    fn state(player: &[u8], dealer_up_card: u8) -> ObservableState {
        let mut hand = CardCount::with_number_of_decks(0);
        for value in player {
            hand.add_card(*value);
        }
        ObservableState::acting(&Rule::default(), &hand, dealer_up_card, 0.0)
    }

    fn agent(budget: SearchBudget, parallel: bool) -> RolloutAgent {
        RolloutAgent::new(&Rule::default(), RolloutConfig { budget, parallel }, 9)
    }

    #[test]
    fn stats_mean_and_merge() {
        let mut a = ActionStats::default();
        assert_eq!(a.ev(), f64::NEG_INFINITY);
        a.update(1.0);
        a.update(-1.0);
        let mut b = ActionStats::default();
        b.update(1.0);
        b.update(1.0);
        a.merge(&b);
        assert_eq!(a.n, 4);
        assert!((a.ev() - 0.5).abs() < 1e-12);
        assert!(a.sem() > 0.0 && a.sem().is_finite());
    }

    #[test]
    fn fixed_playouts_per_action() {
        let mut agent = agent(SearchBudget::Iterations(50), false);
        let report = agent.evaluate(&state(&[10, 2], 4)).unwrap();
        assert_eq!(report.stats[Action::Stand.index()].n, 50);
        assert_eq!(report.stats[Action::Hit.index()].n, 50);
        assert_eq!(report.stats[Action::Double.index()].n, 0);
        assert_eq!(report.playouts(), 100);
    }

    #[test]
    fn stands_on_twenty_and_hits_on_eight() {
        let mut agent = agent(SearchBudget::Iterations(2000), false);
        assert_eq!(agent.decide(&state(&[10, 10], 7)), Ok(Action::Stand));
        assert_eq!(agent.decide(&state(&[5, 3], 7)), Ok(Action::Hit));
    }

    #[test]
    fn parallel_mode_samples_every_action() {
        let mut agent = agent(SearchBudget::Iterations(2000), true);
        let report = agent.evaluate(&state(&[10, 10], 7)).unwrap();
        assert_eq!(report.stats[Action::Stand.index()].n, 2000);
        assert_eq!(report.stats[Action::Hit.index()].n, 2000);
        assert_eq!(report.action, Action::Stand);
    }

    #[test]
    fn zero_budget_falls_back_to_stand() {
        let mut counted = agent(SearchBudget::Iterations(0), false);
        let report = counted.evaluate(&state(&[5, 3], 7)).unwrap();
        assert_eq!(report.action, Action::Stand);
        assert_eq!(report.playouts(), 0);

        let mut timed = agent(SearchBudget::Time(Duration::ZERO), true);
        assert_eq!(timed.decide(&state(&[5, 3], 7)), Ok(Action::Stand));
    }

    #[test]
    fn time_budget_keeps_sample_sizes_within_one() {
        let mut timed = agent(SearchBudget::Time(Duration::from_millis(3)), false);
        let report = timed.evaluate(&state(&[10, 6], 10)).unwrap();
        let stand = report.stats[Action::Stand.index()].n;
        let hit = report.stats[Action::Hit.index()].n;
        assert!(stand > 0);
        assert!(stand == hit || stand == hit + 1);
        assert_eq!(report.playouts(), stand + hit);
    }
}
