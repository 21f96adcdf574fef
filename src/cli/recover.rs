use crate::Result;
use colored::Colorize;

pub async fn run(owner: &str, json: bool) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;

    let restored = orchestrator.execute_protocol_of_return(owner)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&restored)?);
        return Ok(());
    }

    println!("{}", format!("Protocol of Return: {}", owner).cyan().bold());
    println!();
    println!(
        "   {} Restored checkpoint {}",
        "♻️".yellow(),
        restored.restored_checkpoint_id.green()
    );
    println!("   Chain:     {}", restored.checkpoint.chain);
    println!(
        "   Created:   {}",
        restored.checkpoint.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("   Alignment: {:.2}", restored.checkpoint.alignment_score);

    if !restored.skipped.is_empty() {
        println!();
        println!(
            "   {} {} newer checkpoint(s) failed verification:",
            "⚠️".yellow(),
            restored.skipped.len()
        );
        for id in &restored.skipped {
            println!("     - {}", id.red());
        }
    }

    Ok(())
}
