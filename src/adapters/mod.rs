//! Storage adapters for the persistence port.

pub mod memory;
pub mod sqlite;

pub use memory::InMemorySchedulePersistence;
pub use sqlite::SqliteSchedulePersistence;
