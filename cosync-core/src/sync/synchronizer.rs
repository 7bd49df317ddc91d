//! Rendezvous protocol between the host tick and the external step time.

use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use super::dedup::DedupCache;
use super::init::{InitKind, InitializationData, InitializationExchange};
use super::queue::TickQueue;
use super::{Side, SyncError};
use crate::Tick;
use crate::config::SyncConfig;
use crate::container::{InputContainer, ResultContainer};
use crate::messages::ParsedMessage;

/// Shared tick state, guarded by the synchronizer mutex.
#[derive(Debug, Default)]
struct SyncState {
    host_tick: Option<Tick>,
    external_tick: Option<Tick>,
    next_host_tick: Option<Tick>,
    /// Host declared its next tick after entering the current one
    next_host_tick_fresh: bool,
    /// Declaration changed since the external side last looked
    next_host_tick_changed: bool,
    next_regular_tick: Option<Tick>,
    step_size: Option<u64>,
    no_input: bool,
    no_output: bool,
    /// Host has nothing further to publish for the external tick
    finished: bool,
    host_waiting: bool,
    external_waiting: bool,
    closed: bool,
    dedup: DedupCache,
}

impl SyncState {
    fn fresh_next_host_tick(&self) -> Option<Option<Tick>> {
        self.next_host_tick_fresh.then_some(self.next_host_tick)
    }

    fn host_passed(&self, tick: Tick) -> bool {
        self.host_tick.is_some_and(|host| host > tick)
    }

    /// Host will never read input for `tick`.
    fn host_skips(&self, tick: Tick) -> bool {
        self.host_passed(tick) || (self.finished && self.external_tick == Some(tick))
    }

    /// Host tick the external side must visit before its regular boundary.
    ///
    /// Known once the host has reached the external time, or has declared
    /// its next tick from behind it.
    fn intermediate_tick(&self) -> Option<Tick> {
        let external = self.external_tick?;
        let next = self.next_host_tick?;
        let host_ready =
            self.next_host_tick_fresh || self.host_tick.is_some_and(|host| host >= external);

        (host_ready
            && next > external
            && self.next_regular_tick.is_none_or(|boundary| next < boundary))
        .then_some(next)
    }
}

/// Coordinates a host simulator and an external engine advancing in
/// independent ticks.
///
/// Either side may run ahead, fall behind or align with the other. A side
/// that is ahead blocks until the other catches up; a side that is behind
/// proceeds without exchanging data. Neither side is ever offered data for a
/// tick it has already left.
///
/// Host order per tick: [`advance_host_tick`](Self::advance_host_tick),
/// [`receive_input`](Self::receive_input), compute,
/// [`declare_next_host_tick`](Self::declare_next_host_tick),
/// [`publish_result`](Self::publish_result).
pub struct Synchronizer {
    state: Mutex<SyncState>,
    continue_host: Condvar,
    continue_external: Condvar,
    inputs: TickQueue<InputContainer>,
    results: TickQueue<ResultContainer>,
    initialization: InitializationExchange,
    poll_interval: Duration,
}

impl Synchronizer {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state: Mutex::new(SyncState::default()),
            continue_host: Condvar::new(),
            continue_external: Condvar::new(),
            inputs: TickQueue::bounded(
                "input",
                config.input_queue_capacity,
                config.queue_send_timeout,
            ),
            results: TickQueue::bounded(
                "result",
                config.result_queue_capacity,
                config.queue_send_timeout,
            ),
            initialization: InitializationExchange::new(config.handshake_capacity),
            poll_interval: config.poll_interval,
        }
    }

    // --- Host side ---

    /// Records the host's current tick and reconciles it with the external side.
    ///
    /// Behind the external side the host proceeds at once and is finished for
    /// this tick. Aligned, the waiting external side is released. Ahead, the
    /// host blocks until the external side reaches `tick`, unless the external
    /// side is itself waiting on the host, which is logged and not blocked on.
    ///
    /// # Errors
    ///
    /// - `SyncError::ProtocolViolation` - `tick` is behind the host's previous tick
    /// - `SyncError::Closed` - Synchronizer closed before or while waiting
    pub fn advance_host_tick(&self, tick: Tick) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SyncError::Closed);
        }

        if let Some(previous) = state.host_tick {
            if tick < previous {
                return Err(violation(
                    Side::Host,
                    tick,
                    format!("host tick moved backwards from {previous}"),
                ));
            }
        }
        if state.host_tick != Some(tick) {
            state.host_tick = Some(tick);
            state.next_host_tick_fresh = false;
            state.finished = false;
        }

        match state.external_tick {
            Some(external) if tick < external => {
                debug!(tick, external, "Host behind external side, not synchronizing");
                state.finished = true;
                self.wake_external(&mut state);
            }
            Some(external) if tick == external => {
                trace!(tick, "Host aligned with external side");
                self.wake_external(&mut state);
            }
            external => {
                if state.external_waiting {
                    warn!(
                        tick,
                        ?external,
                        next_host_tick = ?state.next_host_tick,
                        "External side waits on the host while the host is ahead, next host tick was mis-declared"
                    );
                    self.wake_external(&mut state);
                    return Ok(());
                }

                debug!(tick, ?external, "Host ahead of external side, waiting");
                while !state.closed && state.external_tick.is_none_or(|external| external < tick) {
                    state.host_waiting = true;
                    self.continue_host.wait(&mut state);
                }
                state.host_waiting = false;
                if state.closed {
                    return Err(SyncError::Closed);
                }
                trace!(tick, external = ?state.external_tick, "Host released");
            }
        }

        Ok(())
    }

    /// Records the next tick at which the host expects input.
    ///
    /// `None` means the host expects no further input. Returns true if the
    /// declaration differs from the previous one.
    pub fn declare_next_host_tick(&self, next_tick: Option<Tick>) -> bool {
        let mut state = self.state.lock();

        let changed = state.next_host_tick != next_tick;
        if changed {
            state.next_host_tick_changed = true;
        }
        state.next_host_tick = next_tick;
        state.next_host_tick_fresh = true;

        if let Some(external) = state.external_tick {
            let behind = state.host_tick.is_none_or(|host| host < external);
            if behind && next_tick.is_none_or(|next| next > external) {
                trace!(external, ?next_tick, "Host will not reach external tick");
                state.finished = true;
            }
        }

        debug!(host_tick = ?state.host_tick, ?next_tick, changed, "Next host tick declared");
        self.wake_external(&mut state);
        changed
    }

    /// Blocks until the external side has pushed initialization data of `kind`.
    ///
    /// # Errors
    ///
    /// - `SyncError::HandshakeClosed` - Synchronizer closed before the data arrived
    pub fn take_initialization_data(&self, kind: InitKind) -> Result<InitializationData, SyncError> {
        self.initialization.take(kind)
    }

    /// Returns true once the host has nothing further to exchange this tick.
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.finished
            || matches!(
                (state.external_tick, state.host_tick),
                (Some(external), Some(host)) if external > host
            )
    }

    /// Returns true once the external side signalled that no input is coming
    /// for the current tick.
    pub fn no_input_signaled(&self) -> bool {
        self.state.lock().no_input
    }

    /// Waits for the input of the host's current tick.
    ///
    /// Returns `None` once the external side signalled no input for this tick
    /// or has moved past it.
    pub fn receive_input(&self) -> Option<InputContainer> {
        let tick = self.state.lock().host_tick?;

        self.inputs.receive(tick, self.poll_interval, || {
            let state = self.state.lock();
            state.closed
                || state.host_tick != Some(tick)
                || state.external_tick.is_some_and(|external| external > tick)
                || (state.external_tick == Some(tick) && state.no_input)
        })
    }

    /// Queues the host's result for the external side.
    ///
    /// Returns false if the queue stayed full for the configured timeout.
    pub fn publish_result(&self, results: ResultContainer) -> bool {
        trace!(tick = results.tick, entries = results.len(), "Publishing result");
        self.results.send(results)
    }

    // --- External side ---

    /// Records the external side's time and reconciles it with the host.
    ///
    /// Reaching the previously computed regular boundary schedules the next
    /// one; stepping before it is an intermediate step requested by the host.
    /// While the host is behind and may still reach `time`, this blocks until
    /// it does or declares a later next tick. A host found waiting on an
    /// earlier tick is released instead, without blocking. Repeating the
    /// current time leaves the boundary untouched.
    ///
    /// # Errors
    ///
    /// - `SyncError::StepSizeUnset` - No step size configured yet
    /// - `SyncError::ProtocolViolation` - Time moved backwards, a regular
    ///   boundary was skipped while the host had not passed it, or a host
    ///   tick announced through [`next_tick`](Self::next_tick) was skipped
    /// - `SyncError::Closed` - Synchronizer closed before or while waiting
    pub fn advance_external_tick(&self, time: Tick) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SyncError::Closed);
        }
        let step_size = state.step_size.ok_or(SyncError::StepSizeUnset)?;

        let repeated = match state.external_tick {
            Some(previous) if time < previous => {
                return Err(violation(
                    Side::External,
                    time,
                    format!("external time moved backwards from {previous}"),
                ));
            }
            Some(previous) if time == previous => {
                trace!(time, "External side repeats current tick");
                true
            }
            _ => {
                if let Some(skipped) = state.intermediate_tick().filter(|next| *next < time) {
                    return Err(violation(
                        Side::External,
                        time,
                        format!("skipped announced host tick {skipped}"),
                    ));
                }
                state.external_tick = Some(time);
                state.no_input = false;
                state.no_output = false;
                state.finished = false;
                false
            }
        };

        if !repeated {
            match state.next_regular_tick {
                Some(boundary) if time < boundary => {
                    debug!(time, boundary, "External side stepping intermediate tick");
                }
                Some(boundary)
                    if time > boundary && state.host_tick.is_none_or(|host| host < boundary) =>
                {
                    return Err(violation(
                        Side::External,
                        time,
                        format!("skipped committed step boundary {boundary}"),
                    ));
                }
                _ => state.next_regular_tick = Some(time.saturating_add(step_size)),
            }
        }

        match state.host_tick {
            Some(host) if host > time => {
                debug!(time, host, "External side behind host, not synchronizing");
                state.finished = true;
                Ok(())
            }
            Some(host) if host == time => {
                trace!(time, "External side aligned with host");
                self.wake_host(&mut state);
                Ok(())
            }
            host if state.host_waiting => {
                warn!(
                    time,
                    ?host,
                    next_host_tick = ?state.next_host_tick,
                    "Host waits on the external side while the external side is ahead, next host tick was mis-declared"
                );
                self.wake_host(&mut state);
                Ok(())
            }
            _ => self.await_host(&mut state, time),
        }
    }

    /// Pushes one initialization payload for the host.
    ///
    /// # Errors
    ///
    /// - `SyncError::HandshakeFull` - Handshake buffer is full
    /// - `SyncError::HandshakeClosed` - Synchronizer was closed
    pub fn push_initialization_data(&self, data: InitializationData) -> Result<(), SyncError> {
        self.initialization.push(data)
    }

    /// Queues parsed input for the host.
    ///
    /// Input for a tick the host will not visit is dropped and signalled as
    /// no input, so nothing piles up while the host is far ahead or behind.
    /// Returns false if the queue was interrupted, so the caller can retry
    /// the tick instead of aborting.
    pub fn submit_input(&self, input: InputContainer) -> bool {
        {
            let mut state = self.state.lock();
            if state.host_skips(input.tick) {
                debug!(
                    tick = input.tick,
                    host_tick = ?state.host_tick,
                    "Host does not visit tick, input dropped"
                );
                state.no_input = true;
                return true;
            }
        }

        trace!(tick = input.tick, "Submitting input");
        self.inputs.send(input)
    }

    /// Polls for the result of the current external tick.
    ///
    /// Each wait is bounded by `interval`; polling repeats until the result
    /// arrives or the host has nothing further to publish for this tick.
    /// Results for other ticks are never returned; repeated polls within the
    /// same tick return the same result. With output suppressed the host's
    /// result is still awaited, then dropped.
    pub fn poll_result(&self, interval: Duration) -> Option<ResultContainer> {
        let tick = self.state.lock().external_tick?;

        let received = self.results.receive(tick, interval, || {
            let state = self.state.lock();
            state.closed
                || state.finished
                || state.host_passed(tick)
                || state.external_tick != Some(tick)
        });

        if self.state.lock().no_output {
            if let Some(dropped) = received {
                trace!(tick, entries = dropped.len(), "Output suppressed, dropping result");
            }
            return None;
        }
        received
    }

    /// Tick the external side should request data for next.
    ///
    /// This is the host's declared next tick when it falls before the regular
    /// boundary and the host has either reached the current external time or
    /// declared it from behind; otherwise the regular boundary.
    pub fn next_tick(&self) -> Option<Tick> {
        let state = self.state.lock();
        state.intermediate_tick().or(state.next_regular_tick)
    }

    /// Returns true when the host must be serviced off the regular schedule
    /// and the requester should be told about it now.
    ///
    /// Consumes the "declaration changed" marker.
    pub fn should_emit_intermediate_output(&self) -> bool {
        let mut state = self.state.lock();
        if state.no_output {
            return false;
        }

        let changed = std::mem::take(&mut state.next_host_tick_changed);
        changed && state.next_host_tick.is_some() && state.next_host_tick != state.next_regular_tick
    }

    /// Marks that no input will be submitted for the current external tick.
    pub fn set_no_input_flag(&self) {
        let mut state = self.state.lock();
        trace!(tick = ?state.external_tick, "No input for tick");
        state.no_input = true;
    }

    /// Marks that no output is requested for the current external tick.
    pub fn set_no_output_flag(&self) {
        let mut state = self.state.lock();
        trace!(tick = ?state.external_tick, "No output for tick");
        state.no_output = true;
    }

    /// Sets the regular external step size once per run.
    ///
    /// # Errors
    ///
    /// - `SyncError::ZeroStepSize` - `step_size` is zero
    /// - `SyncError::StepSizeAlreadySet` - A different step size was set before
    pub fn set_step_size(&self, step_size: u64) -> Result<(), SyncError> {
        if step_size == 0 {
            return Err(SyncError::ZeroStepSize);
        }

        let mut state = self.state.lock();
        match state.step_size {
            Some(current) if current != step_size => {
                Err(SyncError::StepSizeAlreadySet { current })
            }
            _ => {
                state.step_size = Some(step_size);
                Ok(())
            }
        }
    }

    /// Drops messages already forwarded during `tick`.
    pub fn filter_unseen(&self, tick: Tick, messages: Vec<ParsedMessage>) -> Vec<ParsedMessage> {
        self.state.lock().dedup.retain_unseen(tick, messages)
    }

    // --- Observers ---

    pub fn host_tick(&self) -> Option<Tick> {
        self.state.lock().host_tick
    }

    pub fn external_tick(&self) -> Option<Tick> {
        self.state.lock().external_tick
    }

    pub fn next_host_tick(&self) -> Option<Tick> {
        self.state.lock().next_host_tick
    }

    pub fn step_size(&self) -> Option<u64> {
        self.state.lock().step_size
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Ends the run: releases both sides from any wait and rejects further
    /// advances and handshake pushes.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            info!(
                host_tick = ?state.host_tick,
                external_tick = ?state.external_tick,
                "Closing synchronizer"
            );
            state.closed = true;
        }
        state.host_waiting = false;
        state.external_waiting = false;
        self.continue_host.notify_all();
        self.continue_external.notify_all();
        drop(state);

        self.initialization.close();
    }

    // --- Internals ---

    /// Blocks the external side until the host reaches `time` or declares a
    /// next tick beyond it.
    fn await_host(
        &self,
        state: &mut MutexGuard<'_, SyncState>,
        time: Tick,
    ) -> Result<(), SyncError> {
        loop {
            if state.closed {
                state.external_waiting = false;
                return Err(SyncError::Closed);
            }
            if let Some(host) = state.host_tick {
                if host >= time {
                    if host > time {
                        state.finished = true;
                    }
                    break;
                }
            }

            match state.fresh_next_host_tick() {
                Some(None) => {
                    debug!(time, "Host expects no further input");
                    state.finished = true;
                    break;
                }
                Some(Some(next)) if next > time => {
                    debug!(time, next, "Host next tick lies beyond external tick");
                    state.finished = true;
                    break;
                }
                Some(Some(next)) if next < time => {
                    trace!(time, next, "Host catching up");
                }
                _ => {}
            }

            debug!(time, host_tick = ?state.host_tick, "External side ahead of host, waiting");
            state.external_waiting = true;
            self.continue_external.wait(state);
        }

        state.external_waiting = false;
        trace!(time, host_tick = ?state.host_tick, "External side released");
        Ok(())
    }

    fn wake_host(&self, state: &mut SyncState) {
        if state.host_waiting {
            state.host_waiting = false;
            self.continue_host.notify_all();
        }
    }

    fn wake_external(&self, state: &mut SyncState) {
        if state.external_waiting {
            state.external_waiting = false;
            self.continue_external.notify_all();
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

fn violation(side: Side, tick: Tick, reason: String) -> SyncError {
    error!(%side, tick, %reason, "Synchronization protocol violated");
    SyncError::ProtocolViolation { side, tick, reason }
}
