//! Learning hook port.
//!
//! Receives scheduling observations after successful mutations. Delivery is
//! best-effort: a failing hook is logged and never affects the mutation.

use crate::domain::errors::DomainResult;
use crate::domain::models::LearningEvent;

pub trait LearningHook: Send + Sync {
    fn record(&self, event: &LearningEvent) -> DomainResult<()>;
}

/// A hook that discards every event.
#[derive(Debug, Clone, Default)]
pub struct NullLearningHook;

impl NullLearningHook {
    pub fn new() -> Self {
        Self
    }
}

impl LearningHook for NullLearningHook {
    fn record(&self, _event: &LearningEvent) -> DomainResult<()> {
        Ok(())
    }
}
