//! Host tick schedules.

use cosync_core::Tick;

use super::SimulationError;
use super::rng::DeterministicRng;

/// Strictly increasing list of ticks at which the host computes, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSchedule {
    ticks: Vec<Tick>,
}

impl TickSchedule {
    /// Creates a schedule from explicit ticks.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidSchedule` - Empty, not starting at 0, or not strictly increasing
    pub fn fixed(ticks: impl IntoIterator<Item = Tick>) -> Result<Self, SimulationError> {
        let ticks: Vec<Tick> = ticks.into_iter().collect();

        if ticks.first() != Some(&0) {
            return Err(SimulationError::InvalidSchedule {
                reason: "schedule must start at tick 0".to_string(),
            });
        }
        if let Some(pair) = ticks.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(SimulationError::InvalidSchedule {
                reason: format!("tick {} does not follow {}", pair[1], pair[0]),
            });
        }
        Ok(Self { ticks })
    }

    /// Creates a schedule with one tick every `interval` up to `end`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidSchedule` - `interval` is zero
    pub fn regular(interval: Tick, end: Tick) -> Result<Self, SimulationError> {
        if interval == 0 {
            return Err(SimulationError::InvalidSchedule {
                reason: "interval must be positive".to_string(),
            });
        }
        let ticks = (0..=end).step_by(interval as usize).collect();
        Ok(Self { ticks })
    }

    /// Creates a schedule with random gaps in `[1, max_gap]` up to `end`.
    pub fn random(rng: &mut DeterministicRng, end: Tick, max_gap: Tick) -> Self {
        let mut ticks = vec![0];
        let mut tick: Tick = 0;
        loop {
            tick = tick.saturating_add(rng.random_range(1, max_gap.max(1) + 1));
            if tick > end {
                break;
            }
            ticks.push(tick);
        }
        Self { ticks }
    }

    /// Drops every tick after `end`.
    pub fn truncate_after(&mut self, end: Tick) {
        self.ticks.retain(|tick| *tick <= end);
    }

    /// Returns the tick following `tick`, if any.
    pub fn next_after(&self, tick: Tick) -> Option<Tick> {
        let index = self.ticks.partition_point(|candidate| *candidate <= tick);
        self.ticks.get(index).copied()
    }

    /// Returns whether the host computes at `tick`.
    pub fn contains(&self, tick: Tick) -> bool {
        self.ticks.binary_search(&tick).is_ok()
    }

    /// Returns all ticks in order.
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// Returns the final tick.
    pub fn last(&self) -> Option<Tick> {
        self.ticks.last().copied()
    }

    /// Returns number of ticks.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Returns whether the schedule has no ticks.
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
