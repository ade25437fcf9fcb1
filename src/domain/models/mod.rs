pub mod availability;
pub mod capacity;
pub mod config;
pub mod learning;
pub mod scheduled_item;
pub mod slot;
pub mod update;
pub mod validation;
pub mod world_state;

pub use availability::{AvailabilityMap, BlackoutWindow, DayAvailability, DayOfWeek, TimeRange};
pub use capacity::{
    date_key, week_key, CapacityChanges, CapacityConstraints, CapacityMap, CapacitySnapshot,
    PeriodType,
};
pub use config::{CapacityPolicy, Config, DatabaseConfig, LoggingConfig, SchedulingConfig};
pub use learning::LearningEvent;
pub use scheduled_item::{ItemStatus, ScheduledItem};
pub use slot::{
    EnergyLevel, FocusLevel, PartOfDay, SlotQuery, SlotQueryResult, SlotSearchMode, TaskCategory,
    TimeSlot,
};
pub use update::{
    ChangeImpact, SuggestedSlot, UndoOperation, UndoSummary, UpdateAction, UpdateFailure,
    UpdateResult,
};
pub use validation::{BatchValidation, InternalConflict, ItemValidation, ValidationResult};
pub use world_state::{AvailabilitySource, ResolvedAvailability, WorldState};
