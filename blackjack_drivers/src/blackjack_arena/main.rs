mod evaluation;

use std::path::PathBuf;

use anyhow::Context;
use blackjack_agents::{
    strategy::{
        mcts::MctsAgent, qlearning::QLearningAgent, rollout::RolloutAgent, Agent, ThresholdAgent,
    },
    Rule,
};
use blackjack_drivers::{load_config, Config};
use clap::{Parser, ValueEnum};
use tracing::info;

use crate::evaluation::{evaluate_agent, print_policy, print_summary, train_qlearning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AgentChoice {
    All,
    Threshold,
    Rollout,
    Mcts,
    Qlearning,
}

impl AgentChoice {
    fn includes(self, other: AgentChoice) -> bool {
        self == AgentChoice::All || self == other
    }
}

#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// The path of the config file. Defaults to ~/.blackjack_agents.yml, or to
    /// built-in settings when that file does not exist
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which agent to evaluate
    #[arg(short, long, value_enum, default_value_t = AgentChoice::All)]
    agent: AgentChoice,

    /// Number of evaluation rounds, overriding the config
    #[arg(short, long)]
    rounds: Option<u64>,

    /// Seed of the table and the agents, overriding the config
    #[arg(short, long)]
    seed: Option<u64>,

    /// Print the learned Q-learning policy after training
    #[arg(long)]
    dump_policy: bool,

    /// Log filter, used unless RUST_LOG is set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn run(agent: &mut dyn Agent, rule: &Rule, rounds: u64, seed: u64) -> anyhow::Result<()> {
    info!(agent = agent.name(), rounds, "evaluating");
    let stat = evaluate_agent(rule, agent, rounds, seed)
        .with_context(|| format!("evaluation of {} failed", agent.name()))?;
    print_summary(agent.name(), &stat);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::parse();
    init_tracing(&args.log_level);

    let config: Config = load_config(args.config.as_deref())?;
    let rule: Rule = config
        .rule
        .clone()
        .try_into()
        .context("invalid rule in config")?;
    let rounds = args.rounds.unwrap_or(config.evaluation.rounds);
    let seed = args.seed.unwrap_or(config.evaluation.seed);
    info!(?rule, rounds, seed, "config loaded");

    if args.agent.includes(AgentChoice::Threshold) {
        run(&mut ThresholdAgent::default(), &rule, rounds, seed)?;
    }
    if args.agent.includes(AgentChoice::Rollout) {
        let mut agent = RolloutAgent::new(&rule, (&config.rollout).into(), seed);
        run(&mut agent, &rule, rounds, seed)?;
    }
    if args.agent.includes(AgentChoice::Mcts) {
        let mut agent = MctsAgent::new(&rule, (&config.mcts).into(), seed);
        run(&mut agent, &rule, rounds, seed)?;
    }
    if args.agent.includes(AgentChoice::Qlearning) {
        let mut agent = QLearningAgent::new((&config.qlearning).into(), seed);
        let training_rounds = config.qlearning.training_rounds;
        info!(training_rounds, "training q-learning agent");
        let stat = train_qlearning(&rule, &mut agent, training_rounds, seed.wrapping_add(1))
            .context("q-learning training failed")?;
        info!(
            states = agent.table().len(),
            win_rate = stat.get_win_rate(),
            "training finished"
        );
        if args.dump_policy {
            print_policy(&agent);
        }
        run(&mut agent, &rule, rounds, seed)?;
    }

    Ok(())
}
