//! Trajectory Checkpoint Controller (TCPC)
//!
//! Evaluates compliance rules against governance events, creates the
//! checkpoints they call for and runs the Protocol of Return.

mod orchestrator;
mod rule;

pub use orchestrator::{
    ComplianceOrchestrator, ComplianceReport, ComplianceStatus, ComplianceVerdict, EventHandler,
    ProtocolOfReturn, RuleCoverage,
};
pub use rule::{default_rules, ComplianceRule, MetadataFn, TriggerFn};
