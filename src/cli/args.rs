// src/cli/args.rs
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
#[command(arg_required_else_help = true, disable_help_subcommand = true)]
pub struct Args {
    /// Path to the project configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "flashbang.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Verbosity level (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Extract PDFs into markdown, optionally describing images
    Extract {
        /// Only this unit (default: all units)
        #[arg(short, long, value_name = "UNIT")]
        unit: Option<String>,

        /// Skip image extraction
        #[arg(long)]
        no_images: bool,

        /// Skip image descriptions
        #[arg(long)]
        no_describe: bool,
    },

    /// Generate card files from extracted markdown
    Generate {
        /// Only this unit (default: all units)
        #[arg(short, long, value_name = "UNIT")]
        unit: Option<String>,

        /// Override the configured provider
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,
    },

    /// Estimate how much of the model's context window generation would use
    Analyze {
        /// Only this unit (default: all units)
        #[arg(short, long, value_name = "UNIT")]
        unit: Option<String>,

        /// Context window in tokens (default: ask the Ollama model)
        #[arg(long, value_name = "TOKENS")]
        context_length: Option<usize>,
    },

    /// Check a unit's card file and report defects
    Validate {
        #[arg(short, long, value_name = "UNIT")]
        unit: String,
    },

    /// Package card files into .apkg decks
    Package {
        #[arg(short, long, value_name = "UNIT", conflicts_with = "all", required_unless_present = "all")]
        unit: Option<String>,

        /// Package every unit that has a card file
        #[arg(long)]
        all: bool,

        /// Treat validation defects as errors
        #[arg(long)]
        strict: bool,

        /// Stop at the first failing unit
        #[arg(long)]
        stop_on_error: bool,
    },

    /// List units and their pipeline stage
    List {
        /// Show artifact paths per unit
        #[arg(long)]
        detailed: bool,
    },

    /// Show the cards of a unit with statistics
    Inspect {
        #[arg(short, long, value_name = "UNIT")]
        unit: String,
    },

    /// Show or check the configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,

        /// Report configuration problems
        #[arg(long)]
        validate: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Claude,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Ollama => "ollama",
        }
    }
}
