//! Port trait definitions (Hexagonal Architecture)
//!
//! - SchedulePersistence: durable storage for scheduled items and capacity snapshots
//! - LearningHook: best-effort sink for scheduling observations
//!
//! Null implementations are provided for embedders that need neither.

pub mod learning_hook;
pub mod null_persistence;
pub mod persistence;

pub use learning_hook::{LearningHook, NullLearningHook};
pub use null_persistence::NullSchedulePersistence;
pub use persistence::{PersistenceChange, SchedulePersistence};
