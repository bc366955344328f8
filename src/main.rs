//! CLI entry point: `run`, `resume`, and `status`.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use agora::agents::personas;
use agora::checkpoint::CheckpointStore;
use agora::config::DebateConfig;
use agora::cost::CostPreset;
use agora::moderator::Moderator;
use agora::provider::OpenAiCompatClient;

#[derive(Parser, Debug)]
#[command(author, version, about = "Adversarial multi-agent debate orchestrator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new debate on a topic. Prints the debate id on the first
    /// stdout line.
    Run {
        /// The debate topic or resolution.
        topic: String,
        /// Number of rebuttal rounds.
        #[arg(long)]
        rounds: Option<u32>,
        /// Cost budget preset.
        #[arg(long, value_parser = parse_preset)]
        preset: Option<CostPreset>,
        /// Number of crowd personas.
        #[arg(long)]
        crowd_size: Option<usize>,
    },
    /// Resume a debate from its checkpoint.
    Resume {
        /// Id of the debate to resume.
        debate_id: String,
    },
    /// Show checkpoint progress and cost for a debate.
    Status {
        /// Id of the debate to inspect.
        debate_id: String,
    },
}

fn parse_preset(raw: &str) -> Result<CostPreset, String> {
    raw.parse()
}

/// Drive the debate, stopping cleanly on Ctrl-C. Cancellation mid-turn
/// mutates nothing; the last checkpoint is already on disk.
async fn run_interruptible(moderator: &mut Moderator) -> Result<()> {
    let debate_id = moderator.debate_id().to_string();
    tokio::select! {
        result = moderator.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!(debate_id, "interrupted; resume from the last checkpoint to continue");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = DebateConfig::from_env();

    match args.command {
        Command::Run {
            topic,
            rounds,
            preset,
            crowd_size,
        } => {
            if let Some(rounds) = rounds {
                config.rounds = rounds;
            }
            if let Some(preset) = preset {
                config.preset = preset;
            }
            if let Some(crowd_size) = crowd_size {
                config.crowd_size = crowd_size;
            }
            if config.api_key.is_empty() {
                anyhow::bail!("DEBATE_API_KEY is not set");
            }

            let client = Arc::new(OpenAiCompatClient::new(&config.api_base_url, &config.api_key));
            let mut moderator = Moderator::launch(&topic, config, client)?;

            // The debate id is the machine-readable first line of stdout.
            println!("{}", moderator.debate_id());
            info!(debate_id = %moderator.debate_id(), topic, "debate starting");

            run_interruptible(&mut moderator).await?;
        }
        Command::Resume { debate_id } => {
            if config.api_key.is_empty() {
                anyhow::bail!("DEBATE_API_KEY is not set");
            }
            let client = Arc::new(OpenAiCompatClient::new(&config.api_base_url, &config.api_key));
            let mut moderator = Moderator::resume(&debate_id, config, client)?;

            println!("{}", moderator.debate_id());
            info!(debate_id = %moderator.debate_id(), "debate resuming");

            run_interruptible(&mut moderator).await?;
        }
        Command::Status { debate_id } => {
            let checkpoint = CheckpointStore::new(&config.debate_dir(&debate_id)).load()?;
            print!("{checkpoint}");

            println!("Costs by agent:");
            for (agent, cost) in &checkpoint.costs.by_agent {
                println!("  {agent}: ${cost:.2}");
            }

            let crowd = personas::build_personas(config.crowd_size);
            println!("Crowd composition ({} personas):", crowd.len());
            for (kind, count) in personas::distribution(&crowd) {
                println!("  {kind}: {count}");
            }
        }
    }

    Ok(())
}
