//! CLI module - command parsing and dispatch
//!
//! Operator tooling around the orchestration core. `main.rs` calls `cli::run()`.

pub mod config;
pub mod inspect;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "nutrichat")]
#[command(version)]
#[command(about = "Operator tools for the NutriChat orchestration core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected intents and the tools a message would get
    Classify {
        /// The user message to classify
        message: String,
        /// Pretend the thread has a staged proposal
        #[arg(long)]
        pending: bool,
    },
    /// Render the system prompt for a synthetic turn
    Instructions {
        /// User message for the turn
        #[arg(short, long, default_value = "")]
        message: String,
        /// Onboarding step the user is on (default: complete)
        #[arg(long, default_value = "complete")]
        step: String,
        /// Stage a proposal of this kind on the thread
        #[arg(long, value_enum)]
        pending: Option<PendingKind>,
        /// Treat the message as carrying a photo
        #[arg(long)]
        image: bool,
        /// Render in stealth display mode
        #[arg(long)]
        stealth: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file, defaults and environment)
    Show,
    /// Check the configuration file for errors and warnings
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PendingKind {
    Food,
    Weight,
}

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load config early so the logging settings apply; a broken config file
    // is reported by `config check`, not here.
    let logging_cfg = nutrichat::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    nutrichat::utils::logging::init_logging(&logging_cfg)?;

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Classify { message, pending }) => {
            inspect::cmd_classify(&message, pending)?;
        }
        Some(Commands::Instructions {
            message,
            step,
            pending,
            image,
            stealth,
        }) => {
            inspect::cmd_instructions(inspect::InstructionsArgs {
                message,
                step,
                pending,
                image,
                stealth,
            })?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }

    Ok(())
}
