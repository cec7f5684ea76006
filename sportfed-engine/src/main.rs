use std::process;

use clap::{Parser, Subcommand};
use sportfed_core::id::{BracketId, CategoryId, MatchId, ParticipantId};
use sportfed_engine::store::MySqlStore;
use sportfed_engine::{logger, BracketEngine, Config, Error};
use sqlx::mysql::MySqlPool;

#[derive(Debug, Parser)]
#[clap(version, about = "Tournament bracket engine")]
struct Args {
    /// Path to the configuration file.
    #[clap(short, long, default_value = "config.toml")]
    config: String,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generates the bracket for a category from an ordered roster.
    ///
    /// Participants are given in seed order, best first.
    Generate {
        category: CategoryId,
        participants: Vec<ParticipantId>,
    },
    /// Records the result of a match and advances the winner.
    Record {
        #[clap(name = "match")]
        match_id: MatchId,
        winner: ParticipantId,
        #[clap(long)]
        score_a: Option<f64>,
        #[clap(long)]
        score_b: Option<f64>,
    },
    /// Prints a bracket with all its matches as JSON.
    Show { bracket: BracketId },
    /// Clears all recorded results of a bracket, restoring its generated
    /// state.
    Reset { bracket: BracketId },
    /// Deletes a bracket and all its matches.
    Delete { bracket: BracketId },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_file(&args.config).await {
        Ok(config) => config.with_environment(),
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", args.config, err);
            process::exit(1);
        }
    };

    logger::init(config.loglevel);

    if let Err(err) = run(args.command, config).await {
        eprintln!("{}", err);
        process::exit(1);
    }
}

async fn run(command: Command, config: Config) -> Result<(), Error> {
    let pool = MySqlPool::connect(&config.database.connect_string()).await?;

    let store = MySqlStore::new(pool, config.database.prefix.clone());
    store.create_tables().await?;

    let engine = BracketEngine::new(store);

    match command {
        Command::Generate {
            category,
            participants,
        } => {
            let (bracket, matches) = engine.generate(category, &participants).await?;

            log::info!(
                "Generated bracket {} with {} matches",
                bracket.id,
                matches.len()
            );

            println!("{}", serde_json::to_string_pretty(&(bracket, matches))?);
        }
        Command::Record {
            match_id,
            winner,
            score_a,
            score_b,
        } => {
            let record = engine.record_result(match_id, winner, score_a, score_b).await?;

            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Show { bracket } => {
            let view = engine.get_bracket(bracket).await?;

            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Reset { bracket } => {
            engine.reset(bracket).await?;

            println!("Bracket {} reset", bracket);
        }
        Command::Delete { bracket } => {
            engine.delete(bracket).await?;

            println!("Bracket {} deleted", bracket);
        }
    }

    Ok(())
}
