//! Governance lifecycle: the state machine, its handlers and the session registry

mod handlers;
mod manager;
mod session;

pub use manager::{LifecycleManager, DEFAULT_ACTOR};
pub use session::SessionStore;
