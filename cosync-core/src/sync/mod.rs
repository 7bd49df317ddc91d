//! Tick synchronization between the host simulator and the external engine.
//!
//! The [`Synchronizer`] is the only object both sides share. Its tick state
//! is guarded by one mutex with a condition variable per side; payloads
//! travel through separate queues that carry their own synchronization.

mod dedup;
mod init;
mod queue;
mod synchronizer;

pub use dedup::DedupCache;
pub use init::{InitKind, InitializationData, InitializationExchange, SimulationParameters};
pub use synchronizer::Synchronizer;

use std::fmt;

use thiserror::Error;

use crate::Tick;

/// Side of the synchronization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Host,
    External,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Host => write!(f, "host"),
            Side::External => write!(f, "external"),
        }
    }
}

/// Errors raised by the synchronizer and the initialization handshake.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Tick ordering broken by the surrounding scheduling; the run must stop
    #[error("Protocol violation on {side} side at tick {tick}: {reason}")]
    ProtocolViolation {
        side: Side,
        tick: Tick,
        reason: String,
    },

    #[error("External step size has not been set")]
    StepSizeUnset,

    #[error("External step size already set to {current}")]
    StepSizeAlreadySet { current: u64 },

    #[error("External step size must be positive")]
    ZeroStepSize,

    #[error("Initialization buffer full ({capacity} payloads)")]
    HandshakeFull { capacity: usize },

    #[error("Initialization exchange closed")]
    HandshakeClosed,

    /// Run was shut down while a side was waiting
    #[error("Synchronizer closed")]
    Closed,
}

impl SyncError {
    /// Returns true if the run cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::ProtocolViolation { .. })
    }
}

#[cfg(test)]
mod tests;
