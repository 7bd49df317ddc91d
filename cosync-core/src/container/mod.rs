//! Typed payloads exchanged across the tick boundary.
//!
//! An [`InputContainer`] travels from the external side to the host, a
//! [`ResultContainer`] travels back. Both are handed over by value and never
//! mutated by the other side after being enqueued.

mod input;
mod result;

pub use input::{FlexContribution, InputContainer, InputContainerBuilder, PrimaryValue};
pub use result::{
    FlexOptionsResult, NodeResult, PowerResult, ResultContainer, ResultData,
};

use crate::Tick;

/// Payload stamped with the tick it belongs to.
pub trait Ticked {
    fn tick(&self) -> Tick;
}

impl Ticked for InputContainer {
    fn tick(&self) -> Tick {
        self.tick
    }
}

impl Ticked for ResultContainer {
    fn tick(&self) -> Tick {
        self.tick
    }
}
