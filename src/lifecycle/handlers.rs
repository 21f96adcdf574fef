//! Per-state handlers
//!
//! Each handler mutates the context of the running session and reports
//! success as a bool. A handler fails hard only when the context cannot be
//! serialized, or in RECOVERY when no checkpoint is left to return to.

use crate::collaborators::{bounded, Collaborators};
use crate::compliance::ComplianceOrchestrator;
use crate::error::GovernanceResult;
use crate::models::{
    ApprovalDecision, CheckpointRef, ExecutionResult, HealthRecord, LifecycleContext,
    LifecycleState, TelemetryRef, LIFECYCLE_CHAIN, STATUS_COMPLETED, STATUS_RECOVERED,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub(crate) const WITNESS_EVENT: &str = "lifecycle_witness";

/// What the handlers may talk to
pub(crate) struct StateDeps<'a> {
    pub orchestrator: &'a ComplianceOrchestrator,
    pub collaborators: &'a Collaborators,
    pub actor: &'a str,
}

/// Dispatch to the handler for `state`
pub(crate) async fn run_state(
    state: LifecycleState,
    ctx: &mut LifecycleContext,
    deps: &StateDeps<'_>,
) -> GovernanceResult<bool> {
    match state {
        LifecycleState::Preflight => Ok(preflight(ctx)),
        LifecycleState::Health => Ok(health(ctx, deps).await),
        LifecycleState::Classification => Ok(classification(ctx, deps).await),
        LifecycleState::Approval => Ok(approval(ctx, deps).await),
        LifecycleState::Execution => Ok(execution(ctx)),
        LifecycleState::Witness => witness(ctx, deps).await,
        LifecycleState::Checkpoint => checkpoint(ctx, deps),
        LifecycleState::Recovery => recovery(ctx, deps),
        LifecycleState::Final => Ok(finalize(ctx)),
    }
}

fn preflight(ctx: &mut LifecycleContext) -> bool {
    if ctx.user_query.trim().is_empty() {
        tracing::warn!("Preflight rejected an empty request");
        return false;
    }

    let id = Uuid::new_v4().simple().to_string();
    ctx.session_id = format!("session_{}", &id[..12]);
    true
}

async fn health(ctx: &mut LifecycleContext, deps: &StateDeps<'_>) -> bool {
    let collab = deps.collaborators;
    match bounded("health probe", collab.timeout, collab.health.check()).await {
        Ok(report) => {
            let passed = !report.status.is_failing();
            if !passed {
                tracing::warn!(session = %ctx.session_id, detail = %report.detail, "Health check reported critical");
            }
            ctx.health_status = Some(HealthRecord {
                report,
                checked_at: Utc::now(),
            });
            passed
        }
        Err(e) => {
            tracing::warn!(session = %ctx.session_id, error = %e, "Health check unavailable");
            false
        }
    }
}

async fn classification(ctx: &mut LifecycleContext, deps: &StateDeps<'_>) -> bool {
    let collab = deps.collaborators;
    let query = ctx.user_query.clone();
    match bounded("risk classifier", collab.timeout, collab.classifier.classify(&query)).await {
        Ok(classification) => {
            ctx.risk_classification = Some(classification);
            true
        }
        Err(e) => {
            tracing::warn!(session = %ctx.session_id, error = %e, "Classification unavailable");
            false
        }
    }
}

async fn approval(ctx: &mut LifecycleContext, deps: &StateDeps<'_>) -> bool {
    if !ctx.requires_operator_approval() {
        ctx.user_approval = Some(ApprovalDecision::automatic());
        return true;
    }

    // An operator decision is final either way
    if let Some(decision) = ctx.user_approval.as_ref().filter(|d| d.manual_override) {
        return decision.approved;
    }

    if ctx.csi_analysis.is_none() {
        if let Some(analyzer) = &deps.collaborators.analyzer {
            let pipeline_config = json!({
                "session_id": ctx.session_id,
                "query": ctx.user_query,
                "risk_level": ctx.risk_level().map(|l| l.name()),
            });
            match bounded(
                "scenario analyzer",
                deps.collaborators.timeout,
                analyzer.analyze(&pipeline_config),
            )
            .await
            {
                Ok(analysis) => ctx.csi_analysis = Some(analysis),
                Err(e) => {
                    tracing::warn!(session = %ctx.session_id, error = %e, "Scenario analysis unavailable");
                }
            }
        }
    }

    tracing::info!(
        session = %ctx.session_id,
        risk = ?ctx.risk_level(),
        "Approval required before execution"
    );
    ctx.user_approval = Some(ApprovalDecision::pending_review());
    false
}

fn execution(ctx: &mut LifecycleContext) -> bool {
    if !ctx.is_approved() {
        return false;
    }

    ctx.execution_result = Some(ExecutionResult {
        success: true,
        output: "Action executed successfully".to_string(),
        executed_at: Utc::now(),
    });
    true
}

async fn witness(ctx: &mut LifecycleContext, deps: &StateDeps<'_>) -> GovernanceResult<bool> {
    let collab = deps.collaborators;
    let metadata = json!({
        "state": LifecycleState::Witness.name(),
        "session_id": ctx.session_id,
        "risk_level": ctx.risk_level().map(|l| l.name()),
        "approved": ctx.is_approved(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    let snapshot = ctx.to_value()?;

    let (event_id, delivered) = match bounded(
        "telemetry sink",
        collab.timeout,
        collab
            .telemetry
            .record(WITNESS_EVENT, &metadata, deps.actor, &snapshot),
    )
    .await
    {
        Ok(id) => (id, true),
        Err(e) => {
            tracing::warn!(session = %ctx.session_id, error = %e, "Witness event not delivered");
            (format!("evt_local_{}", Uuid::new_v4().simple()), false)
        }
    };

    ctx.telemetry_events.push(TelemetryRef {
        event_id,
        event_type: WITNESS_EVENT.to_string(),
        state: LifecycleState::Witness,
        delivered,
        recorded_at: Utc::now(),
    });
    Ok(true)
}

fn checkpoint(ctx: &mut LifecycleContext, deps: &StateDeps<'_>) -> GovernanceResult<bool> {
    let state: Value = ctx.to_value()?;
    let mut metadata = BTreeMap::new();
    metadata.insert("state".to_string(), json!(LifecycleState::Checkpoint.name()));
    metadata.insert("recovery_needed".to_string(), json!(ctx.recovery_needed));
    metadata.insert("actor".to_string(), json!(deps.actor));

    match deps.orchestrator.checkpoint_session(
        &ctx.session_id,
        &state,
        ctx.alignment_score(),
        metadata,
    ) {
        Ok(cp) => {
            ctx.checkpoint = Some(CheckpointRef {
                checkpoint_id: cp.id,
                state_digest: cp.state_digest,
                created_at: cp.created_at,
            });
            Ok(true)
        }
        Err(e) => {
            tracing::warn!(session = %ctx.session_id, error = %e, "Checkpoint creation failed");
            Ok(false)
        }
    }
}

fn recovery(ctx: &mut LifecycleContext, deps: &StateDeps<'_>) -> GovernanceResult<bool> {
    if !ctx.recovery_needed {
        return Ok(false);
    }

    let restored = deps
        .orchestrator
        .execute_protocol_of_return_in(&ctx.session_id, LIFECYCLE_CHAIN)?;
    let snapshot: LifecycleContext = serde_json::from_value(restored.state)?;

    ctx.restore_outputs_from(snapshot);
    ctx.restored_from = Some(restored.restored_checkpoint_id);
    ctx.final_status = Some(STATUS_RECOVERED.to_string());
    Ok(true)
}

fn finalize(ctx: &mut LifecycleContext) -> bool {
    if !ctx.is_recovered() {
        ctx.final_status = Some(STATUS_COMPLETED.to_string());
    }
    true
}
