//! Per-tick store of already applied input messages.

use crate::Tick;
use crate::messages::ParsedMessage;

/// Remembers which messages were forwarded during the current tick.
///
/// Entries are compared by structural equality of the whole message, so a
/// sender that re-sends an unchanged value is filtered while a changed value
/// passes. Moving to another tick clears the cache.
#[derive(Debug, Default)]
pub struct DedupCache {
    tick: Option<Tick>,
    seen: Vec<ParsedMessage>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the messages of `batch` not yet seen during `tick`.
    pub fn retain_unseen(&mut self, tick: Tick, batch: Vec<ParsedMessage>) -> Vec<ParsedMessage> {
        if self.tick != Some(tick) {
            self.seen.clear();
            self.tick = Some(tick);
        }

        batch
            .into_iter()
            .filter(|message| {
                if self.seen.contains(message) {
                    false
                } else {
                    self.seen.push(message.clone());
                    true
                }
            })
            .collect()
    }

    /// Tick the cached messages belong to.
    pub fn tick(&self) -> Option<Tick> {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
