use anyhow::{bail, Context};
use blackjack_agents::{
    strategy::{
        mcts::MctsConfig, qlearning::QLearningConfig, rollout::RolloutConfig, SearchBudget,
    },
    Rule,
};
use serde::{de::Error as _, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_FILE_NAME: &str = ".blackjack_agents.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rule: ConfigRule,
    pub evaluation: ConfigEvaluation,
    pub rollout: ConfigRollout,
    pub mcts: ConfigMcts,
    pub qlearning: ConfigQLearning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRule {
    pub number_of_decks: u8,
    pub cut_card_proportion: f64,
    pub dealer_hit_on_soft17: bool,
    pub double_policy: String,
}

impl Default for ConfigRule {
    fn default() -> Self {
        Self {
            number_of_decks: 6,
            cut_card_proportion: 0.5,
            dealer_hit_on_soft17: false,
            double_policy: String::from("Never"),
        }
    }
}

impl TryInto<Rule> for ConfigRule {
    type Error = serde::de::value::Error;

    fn try_into(self) -> Result<Rule, Self::Error> {
        if self.number_of_decks == 0 || self.number_of_decks > Rule::MAX_NUMBER_OF_DECKS {
            return Err(serde::de::value::Error::custom(format!(
                "number_of_decks must be between 1 and {}",
                Rule::MAX_NUMBER_OF_DECKS
            )));
        }
        if !(self.cut_card_proportion > 0.0 && self.cut_card_proportion <= 1.0) {
            return Err(serde::de::value::Error::custom(
                "cut_card_proportion must be in (0, 1]",
            ));
        }

        let rule = Rule {
            number_of_decks: self.number_of_decks,
            cut_card_proportion: self.cut_card_proportion,
            dealer_hit_on_soft17: self.dealer_hit_on_soft17,
            double_policy: self.double_policy.parse()?,
        };

        Ok(rule)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigEvaluation {
    pub rounds: u64,
    pub seed: u64,
}

impl Default for ConfigEvaluation {
    fn default() -> Self {
        Self {
            rounds: 1000,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRollout {
    pub time_budget_ms: Option<u64>,
    pub max_playouts_per_action: Option<u32>,
    pub parallel: bool,
}

impl Default for ConfigRollout {
    fn default() -> Self {
        Self {
            time_budget_ms: Some(5),
            max_playouts_per_action: Some(200),
            parallel: false,
        }
    }
}

impl From<&ConfigRollout> for RolloutConfig {
    fn from(config: &ConfigRollout) -> Self {
        RolloutConfig {
            budget: search_budget(config.max_playouts_per_action, config.time_budget_ms),
            parallel: config.parallel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMcts {
    pub time_budget_ms: Option<u64>,
    pub max_iterations: Option<u32>,
    pub exploration_constant: f64,
}

impl Default for ConfigMcts {
    fn default() -> Self {
        Self {
            time_budget_ms: Some(5),
            max_iterations: Some(400),
            exploration_constant: std::f64::consts::SQRT_2,
        }
    }
}

impl From<&ConfigMcts> for MctsConfig {
    fn from(config: &ConfigMcts) -> Self {
        MctsConfig {
            budget: search_budget(config.max_iterations, config.time_budget_ms),
            exploration_constant: config.exploration_constant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigQLearning {
    pub training_rounds: u64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
    pub heat_threshold: f64,
}

impl Default for ConfigQLearning {
    fn default() -> Self {
        let defaults = QLearningConfig::default();
        Self {
            training_rounds: 50_000,
            learning_rate: defaults.learning_rate,
            discount_factor: defaults.discount_factor,
            epsilon: defaults.epsilon,
            epsilon_decay: defaults.epsilon_decay,
            min_epsilon: defaults.min_epsilon,
            heat_threshold: defaults.heat_threshold,
        }
    }
}

impl From<&ConfigQLearning> for QLearningConfig {
    fn from(config: &ConfigQLearning) -> Self {
        QLearningConfig {
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            epsilon: config.epsilon,
            epsilon_decay: config.epsilon_decay,
            min_epsilon: config.min_epsilon,
            heat_threshold: config.heat_threshold,
        }
    }
}

/// A missing limit is no limit. With neither limit set the budget is zero and
/// the search agents fall back to their default action.
fn search_budget(iterations: Option<u32>, time_budget_ms: Option<u64>) -> SearchBudget {
    match (iterations, time_budget_ms.map(Duration::from_millis)) {
        (Some(iterations), Some(time)) => SearchBudget::IterationsWithin { iterations, time },
        (Some(iterations), None) => SearchBudget::Iterations(iterations),
        (None, Some(time)) => SearchBudget::Time(time),
        (None, None) => SearchBudget::Iterations(0),
    }
}

/// Reads the content of a given config file and parses it to a Config.
pub fn parse_config_from_file(filename: &Path) -> anyhow::Result<Config> {
    let file_content = fs::read_to_string(filename)
        .with_context(|| format!("cannot read config file {}", filename.display()))?;
    parse_config(&file_content)
        .with_context(|| format!("cannot parse config file {}", filename.display()))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    Ok(serde_yaml::from_str(content)?)
}

pub fn default_config_path() -> Option<PathBuf> {
    home::home_dir().map(|home_dir| home_dir.join(DEFAULT_CONFIG_FILE_NAME))
}

/// Loads the config from an explicit path, which must exist, or else from the
/// default path in the home directory, falling back to built-in defaults when
/// that file does not exist.
pub fn load_config(explicit_path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit_path {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        if path.is_dir() {
            bail!("{} should be a file rather than a directory", path.display());
        }
        return parse_config_from_file(path);
    }

    match default_config_path() {
        Some(path) if path.is_file() => parse_config_from_file(&path),
        _ => Ok(Config::default()),
    }
}
