//! Monte Carlo Tree Search over the agent's simulated round.
//!
//! Card draws are not modelled as chance nodes. Every iteration starts from a
//! fresh copy of the root round and samples the cards again while it walks
//! down the tree, so a node stands for the sequence of actions that leads to
//! it and its statistics average over every way the cards could have fallen.
//! The snapshot kept in a node is the round as it was first sampled when the
//! node was created.

use std::f64::consts::SQRT_2;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use super::{simulated::SimRound, Agent, SearchBudget, FALLBACK_ACTION};
use crate::{Action, GameError, ObservableState, Rule};

/// Index into the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
pub struct SearchNode {
    /// None for the root.
    pub parent: Option<NodeId>,
    /// Action that led here from the parent. None for the root.
    pub action: Option<Action>,
    pub snapshot: SimRound,
    pub visit_count: u32,
    pub value_sum: f64,
    /// Children in priority order of their actions, created lazily.
    pub children: Vec<(Action, NodeId)>,
    /// Untried actions, highest priority last. None until the node is first
    /// reached in a state where the player can still act.
    untried: Option<Vec<Action>>,
}

impl SearchNode {
    fn new(parent: Option<NodeId>, action: Option<Action>, snapshot: SimRound) -> Self {
        let untried = (!snapshot.is_terminal()).then(|| untried_from(&snapshot));
        Self {
            parent,
            action,
            snapshot,
            visit_count: 0,
            value_sum: 0.0,
            children: Vec::new(),
            untried,
        }
    }

    pub fn mean_value(&self) -> f64 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f64
        }
    }

    /// UCB1 score seen from a parent visited `parent_visits` times. Unvisited
    /// nodes score infinity.
    pub fn ucb_score(&self, parent_visits: u32, exploration_constant: f64) -> f64 {
        if self.visit_count == 0 {
            return f64::INFINITY;
        }
        let exploration =
            ((parent_visits as f64).ln() / self.visit_count as f64).sqrt() * exploration_constant;
        self.mean_value() + exploration
    }
}

fn untried_from(round: &SimRound) -> Vec<Action> {
    let mut actions = round.legal_actions();
    actions.reverse();
    actions
}

/// Arena of search nodes, the root always at index 0.
#[derive(Debug)]
pub struct SearchTree {
    nodes: Vec<SearchNode>,
    iterations: u32,
}

impl SearchTree {
    pub fn new(root: SimRound) -> Self {
        Self {
            nodes: vec![SearchNode::new(None, None, root)],
            iterations: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut SearchNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Completed select-expand-rollout-backpropagate cycles.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn add_child(&mut self, parent: NodeId, action: Action, snapshot: SimRound) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes
            .push(SearchNode::new(Some(parent), Some(action), snapshot));
        self.get_mut(parent).children.push((action, id));
        id
    }

    /// Child with the highest UCB1 score among those whose action is legal in
    /// `legal`. Ties go to the earlier child.
    pub fn select_child(
        &self,
        id: NodeId,
        legal: &[Action],
        exploration_constant: f64,
    ) -> Option<NodeId> {
        let node = self.get(id);
        let mut best: Option<(NodeId, f64)> = None;
        for &(action, child_id) in &node.children {
            if !legal.contains(&action) {
                continue;
            }
            let score = self
                .get(child_id)
                .ucb_score(node.visit_count, exploration_constant);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((child_id, score)),
            }
        }
        best.map(|(child_id, _)| child_id)
    }

    /// Most visited child of the root, ties to the earlier child.
    pub fn best_action(&self) -> Option<Action> {
        let mut best: Option<(Action, u32)> = None;
        for &(action, child_id) in &self.get(self.root()).children {
            let visits = self.get(child_id).visit_count;
            match best {
                Some((_, best_visits)) if visits <= best_visits => {}
                _ => best = Some((action, visits)),
            }
        }
        best.map(|(action, _)| action)
    }

    /// Runs one full cycle from a fresh copy of the root round.
    pub fn iterate<R: Rng + ?Sized>(
        &mut self,
        exploration_constant: f64,
        rng: &mut R,
    ) -> Result<(), GameError> {
        let mut round = self.get(self.root()).snapshot;
        let mut node_id = self.root();
        let mut path = vec![node_id];

        // Selection and expansion
        while !round.is_terminal() {
            let legal = round.legal_actions();
            if legal.is_empty() {
                break;
            }
            let node = self.get_mut(node_id);
            let untried = node.untried.get_or_insert_with(|| untried_from(&round));
            let next_untried = untried.iter().rposition(|action| legal.contains(action));
            if let Some(position) = next_untried {
                let action = untried.remove(position);
                round.step(action, rng)?;
                node_id = self.add_child(node_id, action, round);
                path.push(node_id);
                break;
            }
            let Some(child_id) = self.select_child(node_id, &legal, exploration_constant) else {
                break;
            };
            if let Some(action) = self.get(child_id).action {
                round.step(action, rng)?;
            }
            node_id = child_id;
            path.push(node_id);
        }

        // Rollout
        let reward = round.playout(rng)?;

        // Backpropagation
        for id in path {
            let node = self.get_mut(id);
            node.visit_count += 1;
            node.value_sum += reward;
        }
        self.iterations += 1;
        Ok(())
    }

    pub fn report(&self) -> SearchReport {
        let children = self
            .get(self.root())
            .children
            .iter()
            .map(|&(action, child_id)| {
                let child = self.get(child_id);
                ChildSummary {
                    action,
                    visits: child.visit_count,
                    mean_value: child.mean_value(),
                }
            })
            .collect();
        SearchReport {
            action: self.best_action().unwrap_or(FALLBACK_ACTION),
            iterations: self.iterations,
            children,
            nodes: self.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildSummary {
    pub action: Action,
    pub visits: u32,
    pub mean_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub action: Action,
    pub iterations: u32,
    pub children: Vec<ChildSummary>,
    pub nodes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MctsConfig {
    pub budget: SearchBudget,
    pub exploration_constant: f64,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            budget: SearchBudget::Iterations(1000),
            exploration_constant: SQRT_2,
        }
    }
}

/// Grows a tree from `root` until the budget runs out. The budget is checked
/// between whole cycles only.
pub fn run_search<R: Rng + ?Sized>(
    root: SimRound,
    config: &MctsConfig,
    rng: &mut R,
) -> Result<SearchTree, GameError> {
    let mut tree = SearchTree::new(root);
    if config.budget.is_zero() {
        return Ok(tree);
    }
    let clock = config.budget.start();
    while clock.allows(tree.iterations()) {
        tree.iterate(config.exploration_constant, rng)?;
    }
    trace!(
        iterations = tree.iterations(),
        nodes = tree.len(),
        elapsed_us = clock.elapsed().as_micros() as u64,
        "search finished"
    );
    Ok(tree)
}

pub struct MctsAgent {
    rule: Rule,
    config: MctsConfig,
    rng: ChaCha8Rng,
}

impl MctsAgent {
    pub fn new(rule: &Rule, config: MctsConfig, seed: u64) -> Self {
        Self {
            rule: *rule,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    pub fn search(&mut self, state: &ObservableState) -> Result<SearchReport, GameError> {
        let root = SimRound::from_observation(&self.rule, state);
        let tree = run_search(root, &self.config, &mut self.rng)?;
        Ok(tree.report())
    }
}

impl Agent for MctsAgent {
    fn name(&self) -> &str {
        "mcts"
    }

    fn decide(&mut self, state: &ObservableState) -> Result<Action, GameError> {
        let report = self.search(state)?;
        debug!(
            player = state.player_total,
            dealer_up = state.dealer_up_card,
            action = ?report.action,
            iterations = report.iterations,
            nodes = report.nodes,
            "mcts decision"
        );
        Ok(report.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardCount, DoublePolicy};
    use std::time::Duration;

    fn state(rule: &Rule, player: &[u8], dealer_up_card: u8) -> ObservableState {
        let mut hand = CardCount::with_number_of_decks(0);
        for value in player {
            hand.add_card(*value);
        }
        ObservableState::acting(rule, &hand, dealer_up_card, 0.0)
    }

    fn search(rule: &Rule, state: &ObservableState, iterations: u32) -> SearchTree {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let config = MctsConfig {
            budget: SearchBudget::Iterations(iterations),
            ..Default::default()
        };
        run_search(SimRound::from_observation(rule, state), &config, &mut rng).unwrap()
    }

    #[test]
    fn root_visits_match_completed_iterations() {
        let rule = Rule {
            double_policy: DoublePolicy::AnyTwo,
            ..Default::default()
        };
        let tree = search(&rule, &state(&rule, &[7, 4], 9), 500);
        let root = tree.get(tree.root());
        assert_eq!(tree.iterations(), 500);
        assert_eq!(root.visit_count, 500);
        let child_visits: u32 = root
            .children
            .iter()
            .map(|&(_, id)| tree.get(id).visit_count)
            .sum();
        assert_eq!(child_visits, 500);
        assert_eq!(root.children.len(), 3);
        for &(_, id) in &root.children {
            assert!(tree.get(id).visit_count <= 500);
            assert!(tree.get(id).visit_count > 0);
        }
    }

    #[test]
    fn time_budget_stops_between_whole_iterations() {
        let rule = Rule::default();
        let state = state(&rule, &[10, 6], 10);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let config = MctsConfig {
            budget: SearchBudget::Time(Duration::from_millis(3)),
            ..Default::default()
        };
        let root = SimRound::from_observation(&rule, &state);
        let tree = run_search(root, &config, &mut rng).unwrap();
        let root = tree.get(tree.root());
        assert!(tree.iterations() > 0);
        assert_eq!(root.visit_count, tree.iterations());
        let child_visits: u32 = root
            .children
            .iter()
            .map(|&(_, id)| tree.get(id).visit_count)
            .sum();
        assert_eq!(child_visits, tree.iterations());
    }

    #[test]
    fn children_are_created_in_priority_order() {
        let rule = Rule::default();
        let tree = search(&rule, &state(&rule, &[10, 2], 4), 2);
        let actions: Vec<Action> = tree
            .get(tree.root())
            .children
            .iter()
            .map(|(action, _)| *action)
            .collect();
        assert_eq!(actions, vec![Action::Stand, Action::Hit]);
        assert_eq!(tree.get(tree.root()).untried, Some(Vec::new()));
    }

    #[test]
    fn child_snapshots_are_independent_copies() {
        let rule = Rule::default();
        let mut tree = search(&rule, &state(&rule, &[10, 2], 4), 50);
        let root_id = tree.root();
        let (_, stand_id) = tree.get(root_id).children[0];
        let (_, hit_id) = tree.get(root_id).children[1];
        let root_shoe = *tree.get(root_id).snapshot.shoe();
        let stand_shoe = *tree.get(stand_id).snapshot.shoe();

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let hit_shoe = tree.get_mut(hit_id).snapshot.shoe_mut();
        let before = hit_shoe.remaining();
        hit_shoe.draw(&mut rng).unwrap();
        assert_eq!(hit_shoe.remaining(), before - 1);

        assert_eq!(tree.get(root_id).snapshot.shoe(), &root_shoe);
        assert_eq!(tree.get(stand_id).snapshot.shoe(), &stand_shoe);
        assert_eq!(root_shoe.remaining(), 6 * 52 - 3);
    }

    #[test]
    fn stands_on_twenty() {
        let rule = Rule::default();
        let mut agent = MctsAgent::new(&rule, MctsConfig::default(), 5);
        assert_eq!(agent.decide(&state(&rule, &[10, 10], 10)), Ok(Action::Stand));
    }

    #[test]
    fn hits_on_eleven() {
        let rule = Rule::default();
        let mut agent = MctsAgent::new(&rule, MctsConfig::default(), 5);
        let report = agent.search(&state(&rule, &[6, 5], 10)).unwrap();
        assert_eq!(report.action, Action::Hit);
        assert_eq!(report.iterations, 1000);
    }

    #[test]
    fn zero_budget_falls_back_to_stand() {
        let rule = Rule::default();
        let config = MctsConfig {
            budget: SearchBudget::Time(Duration::ZERO),
            ..Default::default()
        };
        let mut agent = MctsAgent::new(&rule, config, 5);
        let report = agent.search(&state(&rule, &[3, 2], 10)).unwrap();
        assert_eq!(report.action, Action::Stand);
        assert_eq!(report.iterations, 0);
        assert!(report.children.is_empty());
    }

    #[test]
    fn ucb_prefers_unvisited_then_better_means() {
        let rule = Rule::default();
        let root = SimRound::from_observation(&rule, &state(&rule, &[10, 2], 4));
        let mut node = SearchNode::new(None, None, root);
        assert_eq!(node.ucb_score(10, SQRT_2), f64::INFINITY);
        node.visit_count = 4;
        node.value_sum = 2.0;
        let expected = 0.5 + SQRT_2 * ((10f64).ln() / 4.0).sqrt();
        assert!((node.ucb_score(10, SQRT_2) - expected).abs() < 1e-12);
    }
}
