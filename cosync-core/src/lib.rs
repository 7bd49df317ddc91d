//! Cosync Core - tick synchronization for coupled simulators
//!
//! This crate couples a host simulator with an external co-simulation engine
//! that advance through time on independent schedules: the rendezvous
//! protocol, input classification, per-tick payload containers and the
//! identifier mapping between both worlds.

pub mod adapter;
pub mod config;
pub mod container;
pub mod mapping;
pub mod messages;
pub mod sync;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use adapter::{ExternalAdapter, PreparedInput, StepOutput};
pub use config::{CosyncConfig, ParserConfig, SyncConfig};
pub use container::{InputContainer, ResultContainer, ResultData};
pub use mapping::{DataCategory, EntityMapping, MappingEntry, MappingError};
pub use messages::{MessageError, MessageParser, OutputMap, OutputRequest, ParsedMessage};
pub use sync::{InitKind, InitializationData, SimulationParameters, SyncError, Synchronizer};

/// Discrete simulated time, shared unit of both sides.
pub type Tick = u64;

/// Errors that can bubble up from any cosync subsystem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CosyncError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Synchronization error: {0}")]
    Sync(#[from] SyncError),
}

impl CosyncError {
    /// Checks if the run must stop after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            CosyncError::Sync(e) => e.is_fatal(),
            CosyncError::Mapping(_) | CosyncError::Message(_) => false,
        }
    }

    /// Checks if this error stems from data supplied by the external side.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CosyncError::Message(_) | CosyncError::Mapping(MappingError::MissingMapping { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CosyncError>;
