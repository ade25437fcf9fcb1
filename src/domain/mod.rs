//! Domain layer for the world state scheduling engine
//!
//! This module contains the schedule model, its errors and the ports
//! through which the engine reaches storage and learning sinks.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
