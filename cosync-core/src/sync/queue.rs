//! Bounded payload queue that only hands out data for a requested tick.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::Tick;
use crate::container::Ticked;

/// One-direction payload queue between the two sides.
///
/// Payloads for an older tick than the one requested are discarded, payloads
/// for a later tick are held back until that tick is requested. A delivered
/// payload is kept and handed out again to repeated requests for its tick.
pub(crate) struct TickQueue<T> {
    name: &'static str,
    sender: Sender<T>,
    receiver: Receiver<T>,
    held_back: Mutex<VecDeque<T>>,
    delivered: Mutex<Option<T>>,
    send_timeout: Duration,
}

impl<T: Ticked + Clone> TickQueue<T> {
    pub(crate) fn bounded(name: &'static str, capacity: usize, send_timeout: Duration) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            name,
            sender,
            receiver,
            held_back: Mutex::new(VecDeque::new()),
            delivered: Mutex::new(None),
            send_timeout,
        }
    }

    /// Enqueues a payload, returning false if the queue stayed full or closed.
    pub(crate) fn send(&self, item: T) -> bool {
        match self.sender.send_timeout(item, self.send_timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(item)) => {
                warn!(queue = self.name, tick = item.tick(), "Queue full, send interrupted");
                false
            }
            Err(SendTimeoutError::Disconnected(item)) => {
                warn!(queue = self.name, tick = item.tick(), "Queue closed, send interrupted");
                false
            }
        }
    }

    /// Waits for the payload of `tick`, re-checking `settled` every `interval`.
    ///
    /// Once `settled` reports that nothing more will arrive for `tick`, the
    /// queue is drained one last time so a payload enqueued just before the
    /// flag flipped is still delivered.
    pub(crate) fn receive<F>(&self, tick: Tick, interval: Duration, settled: F) -> Option<T>
    where
        F: Fn() -> bool,
    {
        if let Some(item) = self.redeliver(tick) {
            return Some(item);
        }

        let received = loop {
            if let Some(item) = self.take_held_back(tick) {
                break Some(item);
            }
            if settled() {
                break self.drain(tick);
            }

            match self.receiver.recv_timeout(interval) {
                Ok(item) => {
                    if let Some(item) = self.accept(tick, item) {
                        break Some(item);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        if let Some(item) = &received {
            *self.delivered.lock() = Some(item.clone());
        }
        received
    }

    /// Returns the payload already delivered for `tick`, forgetting any
    /// payload delivered for another tick.
    fn redeliver(&self, tick: Tick) -> Option<T> {
        let mut delivered = self.delivered.lock();
        match delivered.as_ref() {
            Some(item) if item.tick() == tick => {
                debug!(queue = self.name, tick, "Repeating delivered payload");
                Some(item.clone())
            }
            Some(_) => {
                *delivered = None;
                None
            }
            None => None,
        }
    }

    fn drain(&self, tick: Tick) -> Option<T> {
        while let Ok(item) = self.receiver.try_recv() {
            if let Some(item) = self.accept(tick, item) {
                return Some(item);
            }
        }
        None
    }

    fn accept(&self, tick: Tick, item: T) -> Option<T> {
        let item_tick = item.tick();
        if item_tick == tick {
            Some(item)
        } else if item_tick < tick {
            debug!(queue = self.name, tick, stale = item_tick, "Discarding stale payload");
            None
        } else {
            debug!(queue = self.name, tick, early = item_tick, "Holding back early payload");
            self.held_back.lock().push_back(item);
            None
        }
    }

    fn take_held_back(&self, tick: Tick) -> Option<T> {
        let mut held_back = self.held_back.lock();
        held_back.retain(|item| item.tick() >= tick);
        let position = held_back.iter().position(|item| item.tick() == tick)?;
        held_back.remove(position)
    }
}
