//! CLI commands for Confessor using clap.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::bot::{self, StreamSupervisor, SupervisorExit};
use crate::config::{
    get_settings_path, load_settings, Credentials, NetworkEnv, Settings, ENCRYPTION_KEY_VAR,
    ENV_VAR, WALLET_KEY_VAR,
};
use crate::game::{ConfessionRecord, GameStore};
use crate::keys::GeneratedKeys;
use crate::transport::{BridgeTransport, Transport};

/// Confessor - group-enrolling chat bot with a guess-the-confessor game.
#[derive(Parser)]
#[command(name = "confessor")]
#[command(version)]
#[command(about = "Confessor - anonymous confessions, public guesses", long_about = None)]
pub struct Commands {
    /// Settings file (default: ~/.confessor/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect and run the bot
    Run {
        /// Hex wallet signing key
        #[arg(long, env = WALLET_KEY_VAR, hide_env_values = true)]
        wallet_key: Option<String>,

        /// Hex key for the local database
        #[arg(long, env = ENCRYPTION_KEY_VAR, hide_env_values = true)]
        encryption_key: Option<String>,

        /// Network: local, dev, production
        #[arg(long = "env", env = ENV_VAR)]
        network: Option<String>,
    },

    /// Generate a wallet key and database encryption key
    Keygen {
        /// Network to record alongside the keys
        #[arg(long = "env", default_value = "dev")]
        network: String,

        /// Append the keys to this env file
        #[arg(long)]
        write: Option<PathBuf>,
    },

    /// Inspect the game store
    #[command(subcommand)]
    Game(GameCommand),

    /// Inspect settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum GameCommand {
    /// Show the open round, if any
    Status,
    /// List every round
    List,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print effective settings
    Show,
    /// Print the settings file path
    Path,
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings_path = self.settings.as_deref();
        match &self.command {
            Command::Run {
                wallet_key,
                encryption_key,
                network,
            } => {
                let settings = load_settings(settings_path)?;
                let credentials = Credentials::from_parts(
                    wallet_key.as_deref(),
                    encryption_key.as_deref(),
                    network.as_deref(),
                )?;
                cmd_run(settings, credentials).await
            }
            Command::Keygen { network, write } => cmd_keygen(network, write.as_deref()),
            Command::Game(cmd) => cmd_game(cmd, &load_settings(settings_path)?),
            Command::Config(cmd) => cmd_config(cmd, settings_path),
        }
    }
}

// Command implementations

async fn cmd_run(settings: Settings, credentials: Credentials) -> Result<()> {
    tracing::info!("Starting Confessor on {}", credentials.env);

    let store = Arc::new(GameStore::open(
        &settings.game.store_path,
        settings.game.max_incorrect_guesses,
    )?);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            trigger.cancel();
        }
    });

    let Some(transport) = connect(&settings, &credentials, &cancel).await else {
        return Ok(());
    };

    let groups = bot::bootstrap(transport.as_ref(), &settings).await?;
    let mut supervisor = StreamSupervisor::new(transport, store, groups, &settings.stream);

    match supervisor.run(cancel).await {
        SupervisorExit::Exhausted => {
            tracing::warn!("Stopped listening: message stream retries exhausted")
        }
        SupervisorExit::Cancelled => tracing::info!("Stopped listening"),
    }
    Ok(())
}

/// Connect and sync, retrying on the stream's schedule. `None` if we gave up.
async fn connect(
    settings: &Settings,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Option<Arc<dyn Transport>> {
    let max_attempts = settings.stream.max_attempts;
    let delay = settings.stream.retry_delay();

    for attempt in 1..=max_attempts {
        let result = async {
            let transport = BridgeTransport::connect(&settings.bridge, credentials).await?;
            transport.sync().await?;
            Ok::<_, crate::transport::TransportError>(transport)
        }
        .await;

        match result {
            Ok(transport) => return Some(Arc::new(transport)),
            Err(e) => {
                tracing::warn!("Connect failed (attempt {}/{}): {}", attempt, max_attempts, e)
            }
        }

        if attempt == max_attempts {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::error!("Giving up on connecting after {} attempts", max_attempts);
    None
}

fn cmd_keygen(network: &str, write: Option<&std::path::Path>) -> Result<()> {
    let env: NetworkEnv = network.parse()?;
    let keys = GeneratedKeys::generate(env);

    match write {
        Some(path) => {
            keys.append_to(path)?;
            println!("✅ Keys written to {}", path.display());
        }
        None => print!("{}", keys.to_env_lines()),
    }
    Ok(())
}

fn round_status(round: &ConfessionRecord, max_incorrect_guesses: u32) -> &'static str {
    if !round.is_complete {
        "open"
    } else if round.incorrect_guesses >= max_incorrect_guesses {
        "unsolved"
    } else {
        "solved"
    }
}

fn cmd_game(cmd: &GameCommand, settings: &Settings) -> Result<()> {
    let max = settings.game.max_incorrect_guesses;
    let path = &settings.game.store_path;
    if !path.exists() {
        println!("No rounds yet ({} does not exist).", path.display());
        return Ok(());
    }
    let store = GameStore::existing(path, max);

    match cmd {
        GameCommand::Status => match store.open_round()? {
            Some(round) => {
                println!("Open round since {}", round.timestamp);
                println!("  \"{}\"", round.question);
                println!("  Wrong guesses: {}/{}", round.incorrect_guesses, max);
            }
            None => println!("No open round."),
        },
        GameCommand::List => {
            let rounds = store.rounds()?;
            if rounds.is_empty() {
                println!("No rounds yet.");
            }
            for (i, round) in rounds.iter().enumerate() {
                println!(
                    "{:>3}. [{}] {} - \"{}\" ({} wrong)",
                    i + 1,
                    round_status(round, max),
                    round.timestamp,
                    round.question,
                    round.incorrect_guesses
                );
            }
        }
    }
    Ok(())
}

fn cmd_config(cmd: &ConfigCommand, path: Option<&std::path::Path>) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let settings = load_settings(path)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigCommand::Path => {
            let path = match path {
                Some(p) => p.to_path_buf(),
                None => get_settings_path()?,
            };
            println!("{}", path.display());
        }
    }
    Ok(())
}
