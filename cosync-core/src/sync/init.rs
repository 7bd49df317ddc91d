//! One-shot initialization handshake from the external side to the host.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SyncError;
use crate::mapping::EntityMapping;

/// Run parameters derived from the external engine's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Regular external step size in ticks
    pub step_size: u64,
    /// Flexibility messages are exchanged during the run
    pub flexibility_enabled: bool,
    /// Set-point commands are exchanged during the run
    pub set_points_enabled: bool,
    /// The external side requests grid results
    pub grid_results_requested: bool,
}

impl SimulationParameters {
    pub fn with_step_size(step_size: u64) -> Self {
        Self {
            step_size,
            flexibility_enabled: false,
            set_points_enabled: false,
            grid_results_requested: true,
        }
    }
}

/// Kind of an initialization payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitKind {
    Parameters,
    Mapping,
}

/// Payload handed over once at startup.
#[derive(Debug, Clone)]
pub enum InitializationData {
    Parameters(SimulationParameters),
    Mapping(Arc<EntityMapping>),
}

impl InitializationData {
    pub fn kind(&self) -> InitKind {
        match self {
            InitializationData::Parameters(_) => InitKind::Parameters,
            InitializationData::Mapping(_) => InitKind::Mapping,
        }
    }
}

#[derive(Debug, Default)]
struct Handshake {
    pending: VecDeque<InitializationData>,
    closed: bool,
}

/// Small bounded buffer consumed by kind.
///
/// Pushing never blocks; taking blocks until a payload of the requested kind
/// has been pushed or the exchange is closed.
#[derive(Debug)]
pub struct InitializationExchange {
    handshake: Mutex<Handshake>,
    available: Condvar,
    capacity: usize,
}

impl InitializationExchange {
    pub fn new(capacity: usize) -> Self {
        Self {
            handshake: Mutex::new(Handshake::default()),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Stores one payload for the host.
    ///
    /// # Errors
    ///
    /// - `SyncError::HandshakeFull` - Buffer already holds `capacity` payloads
    /// - `SyncError::HandshakeClosed` - Exchange was closed
    pub fn push(&self, data: InitializationData) -> Result<(), SyncError> {
        let mut handshake = self.handshake.lock();
        if handshake.closed {
            return Err(SyncError::HandshakeClosed);
        }
        if handshake.pending.len() >= self.capacity {
            return Err(SyncError::HandshakeFull {
                capacity: self.capacity,
            });
        }

        debug!(kind = ?data.kind(), "Initialization data pushed");
        handshake.pending.push_back(data);
        self.available.notify_all();
        Ok(())
    }

    /// Blocks until a payload of `kind` is available and removes it.
    ///
    /// # Errors
    ///
    /// - `SyncError::HandshakeClosed` - Exchange closed before the payload arrived
    pub fn take(&self, kind: InitKind) -> Result<InitializationData, SyncError> {
        let mut handshake = self.handshake.lock();
        loop {
            if let Some(position) = handshake.pending.iter().position(|d| d.kind() == kind) {
                if let Some(data) = handshake.pending.remove(position) {
                    debug!(?kind, "Initialization data taken");
                    return Ok(data);
                }
            }
            if handshake.closed {
                return Err(SyncError::HandshakeClosed);
            }
            self.available.wait(&mut handshake);
        }
    }

    /// Wakes all blocked takers; further pushes fail.
    pub fn close(&self) {
        self.handshake.lock().closed = true;
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_take_filters_by_kind() {
        let exchange = InitializationExchange::new(4);
        exchange
            .push(InitializationData::Mapping(Arc::new(EntityMapping::default())))
            .unwrap();
        exchange
            .push(InitializationData::Parameters(SimulationParameters::with_step_size(900)))
            .unwrap();

        let parameters = exchange.take(InitKind::Parameters).unwrap();
        assert!(matches!(
            parameters,
            InitializationData::Parameters(SimulationParameters { step_size: 900, .. })
        ));
        assert_eq!(exchange.take(InitKind::Mapping).unwrap().kind(), InitKind::Mapping);
    }

    #[test]
    fn test_take_blocks_until_pushed() {
        let exchange = Arc::new(InitializationExchange::new(4));
        let taker = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || exchange.take(InitKind::Parameters))
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!taker.is_finished());
        exchange
            .push(InitializationData::Parameters(SimulationParameters::with_step_size(60)))
            .unwrap();

        let data = taker.join().unwrap().unwrap();
        assert_eq!(data.kind(), InitKind::Parameters);
    }

    #[test]
    fn test_full_buffer_rejects_push() {
        let exchange = InitializationExchange::new(1);
        let data = InitializationData::Parameters(SimulationParameters::with_step_size(1));

        exchange.push(data.clone()).unwrap();
        assert!(matches!(
            exchange.push(data),
            Err(SyncError::HandshakeFull { capacity: 1 })
        ));
    }

    #[test]
    fn test_close_releases_taker() {
        let exchange = Arc::new(InitializationExchange::new(2));
        let taker = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || exchange.take(InitKind::Mapping))
        };

        thread::sleep(Duration::from_millis(10));
        exchange.close();
        assert!(matches!(taker.join().unwrap(), Err(SyncError::HandshakeClosed)));
    }
}
