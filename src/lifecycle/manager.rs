//! LifecycleManager - drives one request through the governance states

use super::handlers::{run_state, StateDeps};
use super::session::SessionStore;
use crate::collaborators::Collaborators;
use crate::compliance::ComplianceOrchestrator;
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{
    ApprovalDecision, HistoryEntry, LifecycleContext, LifecycleState, STATUS_COMPLETED,
};
use chrono::Utc;
use std::sync::Arc;

pub const DEFAULT_ACTOR: &str = "lifecycle_manager";

/// State machine for a single governed request
pub struct LifecycleManager {
    orchestrator: Arc<ComplianceOrchestrator>,
    collaborators: Collaborators,
    sessions: Option<Arc<SessionStore>>,
    actor: String,
    current_state: LifecycleState,
    context: Option<LifecycleContext>,
    history: Vec<HistoryEntry>,
    /// Successor of CHECKPOINT, fixed the first time it is computed in a run
    fork: Option<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(orchestrator: Arc<ComplianceOrchestrator>, collaborators: Collaborators) -> Self {
        Self {
            orchestrator,
            collaborators,
            sessions: None,
            actor: DEFAULT_ACTOR.to_string(),
            current_state: LifecycleState::Preflight,
            context: None,
            history: Vec::new(),
            fork: None,
        }
    }

    /// Publish every context change into a shared session store
    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn current_state(&self) -> LifecycleState {
        self.current_state
    }

    pub fn context(&self) -> Option<&LifecycleContext> {
        self.context.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn orchestrator(&self) -> &Arc<ComplianceOrchestrator> {
        &self.orchestrator
    }

    /// FINAL reached through the normal path
    pub fn is_complete(&self) -> bool {
        self.current_state == LifecycleState::Final
            && self
                .context
                .as_ref()
                .and_then(|c| c.final_status.as_deref())
                == Some(STATUS_COMPLETED)
    }

    // =========================================================================
    // Driving the lifecycle
    // =========================================================================

    /// Begin a run for `request` and execute PREFLIGHT
    pub async fn start(&mut self, request: &str) -> GovernanceResult<&LifecycleContext> {
        self.context = Some(LifecycleContext::new(request));
        self.current_state = LifecycleState::Preflight;
        self.history.clear();
        self.fork = None;

        tracing::info!(actor = %self.actor, "Starting governance lifecycle");

        if !self.execute_state(LifecycleState::Preflight).await? {
            self.context = None;
            return Err(GovernanceError::StateHandlerFailure {
                state: LifecycleState::Preflight,
                reason: "request rejected at preflight".to_string(),
            });
        }

        self.context.as_ref().ok_or(GovernanceError::NoActiveContext)
    }

    /// Move to the next state and run its handler.
    ///
    /// Returns the handler's success. On `false` the cursor stays where it was
    /// and the same transition can be retried.
    pub async fn advance(&mut self) -> GovernanceResult<bool> {
        let ctx = self.context.as_ref().ok_or(GovernanceError::NoActiveContext)?;

        let next = if self.current_state == LifecycleState::Checkpoint {
            match self.fork {
                Some(fork) => Some(fork),
                None => {
                    let fork = self.current_state.successor(ctx.recovery_needed);
                    self.fork = fork;
                    fork
                }
            }
        } else {
            self.current_state.successor(false)
        };

        let next = next.ok_or(GovernanceError::InvalidStateTransition {
            from: self.current_state,
        })?;

        self.execute_state(next).await
    }

    async fn execute_state(&mut self, state: LifecycleState) -> GovernanceResult<bool> {
        let ctx = self
            .context
            .as_mut()
            .ok_or(GovernanceError::NoActiveContext)?;

        let entry_time = Utc::now();
        let context_snapshot = ctx.to_value()?;

        let deps = StateDeps {
            orchestrator: self.orchestrator.as_ref(),
            collaborators: &self.collaborators,
            actor: self.actor.as_str(),
        };
        let outcome = run_state(state, ctx, &deps).await;
        let success = matches!(outcome, Ok(true));

        self.history.push(HistoryEntry {
            state,
            entry_time,
            exit_time: Utc::now(),
            success,
            context_snapshot,
        });

        let session = ctx.session_id.clone();
        if success {
            self.current_state = state;
            tracing::info!(session = %session, state = %state, "Entered state");
        } else {
            match &outcome {
                Err(e) => tracing::error!(session = %session, state = %state, error = %e, "State handler failed"),
                Ok(_) => tracing::warn!(session = %session, state = %state, "State handler did not pass"),
            }
        }

        if let Some(sessions) = &self.sessions {
            if !ctx.session_id.is_empty() {
                sessions.put(ctx.clone());
            }
        }

        outcome
    }

    // =========================================================================
    // Operator controls
    // =========================================================================

    /// Request recovery; takes effect when the run next leaves CHECKPOINT
    pub fn trigger_recovery(&mut self, reason: &str) -> GovernanceResult<()> {
        let ctx = self.active_context("recovery requested")?;
        ctx.recovery_needed = true;
        ctx.final_status = Some(format!("recovery_triggered: {}", reason));
        let session = ctx.session_id.clone();
        tracing::warn!(session = %session, reason, "Recovery triggered");
        self.publish();
        Ok(())
    }

    /// Record an operator approval for a gated request
    pub fn approve(&mut self, approver: &str) -> GovernanceResult<()> {
        self.decide(true, approver)
    }

    /// Record an operator denial for a gated request
    pub fn deny(&mut self, approver: &str) -> GovernanceResult<()> {
        self.decide(false, approver)
    }

    fn decide(&mut self, approved: bool, approver: &str) -> GovernanceResult<()> {
        let ctx = self.active_context("operator decision")?;
        ctx.user_approval = Some(ApprovalDecision::operator(approved, approver));
        let session = ctx.session_id.clone();
        tracing::info!(session = %session, approved, approver, "Operator decision recorded");
        self.publish();
        Ok(())
    }

    /// Rewind to PREFLIGHT.
    ///
    /// With `retain_session` the session id and request survive and run
    /// outputs are cleared; otherwise the context is dropped.
    pub fn reset(&mut self, retain_session: bool) {
        self.current_state = LifecycleState::Preflight;
        self.history.clear();
        self.fork = None;

        if retain_session {
            if let Some(ctx) = self.context.as_mut() {
                ctx.clear_run_outputs();
            }
            self.publish();
        } else {
            self.context = None;
        }
    }

    fn active_context(&mut self, action: &str) -> GovernanceResult<&mut LifecycleContext> {
        self.context
            .as_mut()
            .ok_or_else(|| GovernanceError::ContextNotFound(format!("no active lifecycle for {}", action)))
    }

    fn publish(&self) {
        if let (Some(sessions), Some(ctx)) = (&self.sessions, &self.context) {
            if !ctx.session_id.is_empty() {
                sessions.put(ctx.clone());
            }
        }
    }
}
