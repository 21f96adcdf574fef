use crate::Result;
use colored::Colorize;

pub async fn run(chain: &str) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;

    let path = orchestrator.export_compliance_report(chain, &config.reports_path(&project_root))?;

    println!(
        "{} {}",
        "📄".cyan(),
        format!("Compliance report written to {}", path.display()).green()
    );

    Ok(())
}
