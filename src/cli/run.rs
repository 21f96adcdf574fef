use crate::collaborators::{Collaborators, FixedClassifier, FixedHealthProbe, TracingTelemetry};
use crate::compliance::ComplianceOrchestrator;
use crate::lifecycle::LifecycleManager;
use crate::models::{
    Classification, HistoryEntry, LifecycleContext, LifecycleState, RiskLevel,
};
use crate::Result;
use colored::Colorize;
use dialoguer::Confirm;
use serde::Serialize;
use serde_json::json;
use std::io::IsTerminal;
use std::sync::Arc;

const OPERATOR: &str = "cli_operator";

pub struct RunOptions {
    pub risk: RiskLevel,
    pub approve: bool,
    pub recover: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Recovered,
    Blocked(LifecycleState),
}

#[derive(Serialize)]
struct RunSummary<'a> {
    outcome: &'static str,
    current_state: LifecycleState,
    history: &'a [HistoryEntry],
    context: Option<&'a LifecycleContext>,
}

pub async fn run(request: &str, options: RunOptions) -> Result<()> {
    let (project_root, config) = super::load_project()?;
    let orchestrator = super::open_orchestrator(&project_root, &config)?;

    let collaborators = Collaborators::new(
        Arc::new(FixedHealthProbe::healthy()),
        Arc::new(FixedClassifier::new(options.risk)),
        Arc::new(TracingTelemetry),
    )
    .with_timeout(config.collaborator_timeout());
    let mut manager =
        LifecycleManager::new(orchestrator, collaborators).with_actor(config.actor.clone());

    if !options.json {
        println!("{}", format!("Governing request: {}", request).cyan().bold());
        println!();
    }

    let outcome = drive(&mut manager, request, &options).await?;

    if options.json {
        let summary = RunSummary {
            outcome: match outcome {
                RunOutcome::Completed => "completed",
                RunOutcome::Recovered => "recovered",
                RunOutcome::Blocked(_) => "blocked",
            },
            current_state: manager.current_state(),
            history: manager.history(),
            context: manager.context(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    let session = manager
        .context()
        .map(|c| c.session_id.clone())
        .unwrap_or_default();
    match outcome {
        RunOutcome::Completed => {
            println!("{}", format!("✅ Lifecycle completed ({})", session).green().bold());
        }
        RunOutcome::Recovered => {
            let restored = manager
                .context()
                .and_then(|c| c.restored_from.clone())
                .unwrap_or_default();
            println!(
                "{}",
                format!("♻️  Recovered from checkpoint {} ({})", restored, session)
                    .yellow()
                    .bold()
            );
        }
        RunOutcome::Blocked(state) => {
            println!(
                "{}",
                format!("⛔ Lifecycle blocked at {} ({})", state, session).red().bold()
            );
            if state == LifecycleState::Approval {
                println!("   Re-run with {} to supply operator approval", "--approve".cyan());
            }
        }
    }

    Ok(())
}

async fn drive(
    manager: &mut LifecycleManager,
    request: &str,
    options: &RunOptions,
) -> Result<RunOutcome> {
    manager.start(request).await?;
    print_step(manager, options.json);

    if let Some(reason) = &options.recover {
        manager.trigger_recovery(reason)?;
    }

    let mut operator_consulted = false;
    while manager.current_state() != LifecycleState::Final {
        let from = manager.current_state();
        let passed = manager.advance().await?;
        print_step(manager, options.json);

        if passed {
            emit_transition_events(manager, from);
            continue;
        }

        let failed = manager.history().last().map(|h| h.state).unwrap_or(from);
        if failed == LifecycleState::Approval && !operator_consulted {
            operator_consulted = true;
            if operator_approves(options)? {
                manager.approve(OPERATOR)?;
                continue;
            }
            manager.deny(OPERATOR)?;
        }
        return Ok(RunOutcome::Blocked(failed));
    }

    let recovered = manager
        .context()
        .is_some_and(|c| c.is_recovered());
    Ok(if recovered {
        RunOutcome::Recovered
    } else {
        RunOutcome::Completed
    })
}

fn operator_approves(options: &RunOptions) -> Result<bool> {
    if options.approve {
        return Ok(true);
    }
    if options.json || !std::io::stdin().is_terminal() {
        return Ok(false);
    }

    let approved = Confirm::new()
        .with_prompt(format!("Approve {} risk request?", options.risk))
        .default(false)
        .interact()?;
    Ok(approved)
}

/// Feed the compliance rules with what the run just did
fn emit_transition_events(manager: &LifecycleManager, from: LifecycleState) {
    let Some(ctx) = manager.context() else {
        return;
    };
    let orchestrator: &ComplianceOrchestrator = manager.orchestrator();
    let to = manager.current_state();

    orchestrator.process_event(
        "state_change",
        &json!({
            "session_id": ctx.session_id,
            "from_state": from.name(),
            "to_state": to.name(),
            "reason": "advance",
            "alignment_score": ctx.alignment_score(),
        }),
    );

    if to == LifecycleState::Classification {
        if let Some(Classification::Classified {
            level,
            confidence,
            reasoning,
        }) = &ctx.risk_classification
        {
            orchestrator.process_event(
                "classification_complete",
                &json!({
                    "session_id": ctx.session_id,
                    "risk_level": level.name(),
                    "confidence": confidence,
                    "patterns_matched": reasoning,
                }),
            );
        }
    }
}

fn print_step(manager: &LifecycleManager, json: bool) {
    if json {
        return;
    }
    let Some(entry) = manager.history().last() else {
        return;
    };

    let mark = if entry.success {
        "✓".green()
    } else {
        "✗".red()
    };
    let elapsed = (entry.exit_time - entry.entry_time).num_milliseconds();
    println!(
        "   {} {:<15} {} {}",
        entry.state.emoji(),
        entry.state.name().to_uppercase(),
        mark,
        format!("({}ms)", elapsed).bright_black()
    );
}
