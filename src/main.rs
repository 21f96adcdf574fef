use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use governd::cli::checkpoints::CheckpointCommands;
use governd::cli::run::RunOptions;
use governd::models::{RiskLevel, LIFECYCLE_CHAIN};
use governd::Result;
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "governd")]
#[command(author = "Chris Cheng <chris.cheng@shopee.com>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Governance lifecycle engine with tamper-evident checkpoints", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a request through the governance lifecycle
    Run {
        /// The request to govern
        request: String,

        /// Risk level assigned by the built-in classifier
        #[arg(long, default_value = "low")]
        risk: RiskLevel,

        /// Supply operator approval when the approval gate blocks
        #[arg(long)]
        approve: bool,

        /// Flag a recoverable fault so the run returns to its checkpoint
        #[arg(long, value_name = "REASON")]
        recover: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Checkpoint inspection
    #[command(subcommand)]
    Checkpoints(CheckpointCommands),

    /// Show compliance status of a checkpoint chain
    Status {
        /// Chain to inspect
        #[arg(long, default_value = LIFECYCLE_CHAIN)]
        chain: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the Protocol of Return for an owner
    Recover {
        /// Owner (session id) to restore
        owner: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a compliance report for a chain
    Report {
        /// Chain to report on
        #[arg(long, default_value = LIFECYCLE_CHAIN)]
        chain: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Error: failed to create tokio runtime: {}", e).red());
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_async(cli)) {
        eprintln!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run_async(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            request,
            risk,
            approve,
            recover,
            json,
        } => {
            let options = RunOptions {
                risk,
                approve,
                recover,
                json,
            };
            governd::cli::run::run(&request, options).await?;
        }

        Commands::Checkpoints(cmd) => {
            governd::cli::checkpoints::run(cmd).await?;
        }

        Commands::Status { chain, json } => {
            governd::cli::status::run(&chain, json).await?;
        }

        Commands::Recover { owner, json } => {
            governd::cli::recover::run(&owner, json).await?;
        }

        Commands::Report { chain } => {
            governd::cli::report::run(&chain).await?;
        }

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "governd", &mut io::stdout());
        }
    }

    Ok(())
}
