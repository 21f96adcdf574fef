//! Checkpoint CLI commands

use crate::models::Checkpoint;
use crate::Result;
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// List checkpoints, newest first
    List {
        /// Only checkpoints of this owner (session id)
        #[arg(long)]
        owner: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a checkpoint and its stored state
    Show {
        /// Checkpoint ID
        id: String,
    },

    /// Verify a checkpoint's stored state against its digest
    Verify {
        /// Checkpoint ID
        id: String,
    },
}

pub async fn run(cmd: CheckpointCommands) -> Result<()> {
    match cmd {
        CheckpointCommands::List { owner, json } => list(owner.as_deref(), json).await,
        CheckpointCommands::Show { id } => show(&id).await,
        CheckpointCommands::Verify { id } => verify(&id).await,
    }
}

pub async fn list(owner: Option<&str>, json: bool) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;
    let checkpoints = orchestrator.store().list(owner)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!("{}", "No checkpoints recorded".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Checkpoints ({})", checkpoints.len()).cyan().bold()
    );
    println!();
    for checkpoint in &checkpoints {
        println!(
            "   {}  {}  {:<20} {:<22} {:.2}",
            checkpoint.created_at.format("%Y-%m-%d %H:%M:%S"),
            checkpoint.id,
            checkpoint.chain,
            checkpoint.checkpoint_type.name(),
            checkpoint.alignment_score
        );
    }

    Ok(())
}

pub async fn show(id: &str) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;
    let store = orchestrator.store();

    let Some(checkpoint) = store.get(id)? else {
        println!("{}", format!("Checkpoint '{}' not found", id).red());
        return Ok(());
    };
    let state = store.snapshot(id)?;

    print_header(&checkpoint);
    println!();
    println!("{}", "State:".bold());
    println!("{}", serde_json::to_string_pretty(&state)?);

    Ok(())
}

pub async fn verify(id: &str) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;
    let store = orchestrator.store();

    let Some(checkpoint) = store.get(id)? else {
        println!("{}", format!("Checkpoint '{}' not found", id).red());
        return Ok(());
    };

    if store.verify_stored(&checkpoint)? {
        println!("{} {}", "✓".green(), format!("{} verified", id).green());
    } else {
        println!(
            "{} {}",
            "✗".red(),
            format!("{} failed verification: stored state does not match {}", id, checkpoint.state_digest).red()
        );
        anyhow::bail!("checkpoint {} failed integrity verification", id);
    }

    Ok(())
}

fn print_header(checkpoint: &Checkpoint) {
    println!("{}", format!("Checkpoint: {}", checkpoint.id).cyan().bold());
    println!();
    println!("   Owner:     {}", checkpoint.owner_id);
    println!("   Chain:     {}", checkpoint.chain);
    println!("   Type:      {}", checkpoint.checkpoint_type);
    println!("   Created:   {}", checkpoint.created_at.format("%Y-%m-%d %H:%M:%S%.3f"));
    println!("   Sequence:  {}", checkpoint.sequence);
    println!("   Alignment: {:.2}", checkpoint.alignment_score);
    println!("   Digest:    {}", checkpoint.state_digest);

    if !checkpoint.metadata.is_empty() {
        println!("   Metadata:");
        for (key, value) in &checkpoint.metadata {
            println!("     {}: {}", key, value);
        }
    }
}
