//! Worldstate - per-user scheduling engine
//!
//! Worldstate keeps an in-memory model of one user's calendar (scheduled
//! items, availability, capacity limits and blackout windows) and offers
//! validated, transactional updates plus free-slot search over it.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): the schedule model, errors and ports
//! - **Service Layer** (`services`): validation, slot search, the updater
//!   and the per-user engine facade
//! - **Adapters** (`adapters`): SQLite and in-memory persistence
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use worldstate::{EngineRegistry, InMemorySchedulePersistence, SchedulingConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemorySchedulePersistence::new());
//!     let registry = EngineRegistry::new(SchedulingConfig::default(), store);
//!     let engine = registry.engine_for("user-1").await?;
//!     let slot = engine.find_next_free_slot(60, None).await;
//!     println!("{slot:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::{InMemorySchedulePersistence, SqliteSchedulePersistence};
pub use domain::models::{
    AvailabilityMap, BlackoutWindow, CapacityConstraints, CapacityPolicy, Config, DayAvailability,
    DayOfWeek, ItemStatus, LearningEvent, ScheduledItem, SchedulingConfig, SlotQuery,
    SlotQueryResult, SlotSearchMode, TimeRange, TimeSlot, UpdateAction, UpdateFailure,
    UpdateResult, ValidationResult, WorldState,
};
pub use domain::ports::{LearningHook, PersistenceChange, SchedulePersistence};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::LoggerImpl;
pub use services::{
    EngineRegistry, SchedulingEngine, SlotQueryEngine, WorldUpdater, WorldValidator,
};
