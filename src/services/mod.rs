pub mod engine;
pub mod registry;
pub mod slot_query;
pub mod undo_history;
pub mod updater;
pub mod validator;

pub use engine::SchedulingEngine;
pub use registry::{default_availability, EngineRegistry};
pub use slot_query::SlotQueryEngine;
pub use undo_history::UndoHistory;
pub use updater::WorldUpdater;
pub use validator::WorldValidator;
