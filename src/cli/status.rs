use crate::compliance::{ComplianceStatus, ComplianceVerdict};
use crate::Result;
use colored::Colorize;

pub async fn run(chain: &str, json: bool) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;
    let status = orchestrator.compliance_status(chain)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    Ok(())
}

fn print_status(status: &ComplianceStatus) {
    let summary = &status.trajectory_summary;
    println!("{}", format!("Compliance status: {}", summary.chain).cyan().bold());
    println!();

    let (icon, verdict) = match status.status {
        ComplianceVerdict::Compliant => ("✅", "compliant".green()),
        ComplianceVerdict::IntegrityFailure => ("⛔", "integrity failure".red()),
    };

    println!("   Verdict:     {} {}", icon, verdict);
    println!(
        "   Verified:    {}/{}",
        summary.verified_checkpoints, summary.total_checkpoints
    );

    if let Some(average) = summary.average_alignment {
        println!("   Alignment:   {:.2}", average);
    }
    if let Some(first) = &summary.first_checkpoint_at {
        println!("   First:       {}", first.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(last) = &summary.last_checkpoint_at {
        println!("   Last:        {}", last.format("%Y-%m-%d %H:%M:%S"));
    }

    println!(
        "   Rules fired: {}/{} ({:.0}%)",
        status.rule_coverage.fired_rules,
        status.rule_coverage.total_rules,
        status.rule_coverage.percentage
    );

    for id in &summary.failed_checkpoints {
        println!("   {} {}", "✗".red(), id.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointStore;
    use crate::compliance::ComplianceOrchestrator;
    use crate::models::LIFECYCLE_CHAIN;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_status_of_file_backed_chain() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(CheckpointStore::open(temp_dir.path().join("checkpoints")).unwrap());
        let orchestrator = ComplianceOrchestrator::with_default_rules(store, "governd");

        orchestrator
            .checkpoint_session("session_a", &json!({"step": 1}), 0.9, BTreeMap::new())
            .unwrap();

        let status = orchestrator.compliance_status(LIFECYCLE_CHAIN).unwrap();
        assert_eq!(status.status, ComplianceVerdict::Compliant);
        assert_eq!(status.trajectory_summary.total_checkpoints, 1);

        // Rendering must not panic on a populated summary
        print_status(&status);
    }

    #[test]
    fn test_status_of_empty_chain() {
        let orchestrator =
            ComplianceOrchestrator::with_default_rules(Arc::new(CheckpointStore::in_memory()), "governd");
        let status = orchestrator.compliance_status("missing").unwrap();

        assert_eq!(status.status, ComplianceVerdict::Compliant);
        assert_eq!(status.trajectory_summary.total_checkpoints, 0);
        print_status(&status);
    }
}
