//! Classification of step inputs and translation of step outputs.
//!
//! Inputs arrive as a nested map `receiver -> label -> sender -> value` and
//! are classified through a closed label table into [`ParsedMessage`]s.
//! Results travel the other way through [`OutputTranslator`].

mod classify;
mod output;
mod parser;
mod types;

pub use classify::{InputAttribute, classify_value};
pub use output::{OutputAttribute, OutputMap, OutputRequest, OutputTranslator};
pub use parser::{MessageParser, ParsedInput, RawInputMap};
pub use types::{
    FlexBand, FlexOption, MessageContent, ParsedMessage, PowerUnit, Quantity, SetPoint,
};

use thiserror::Error;

/// Errors raised while classifying inputs or translating outputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error("Unknown attribute '{attribute}' for receiver '{receiver}'")]
    UnknownAttribute { receiver: String, attribute: String },

    #[error("Malformed value for '{attribute}' of '{receiver}': {reason}")]
    MalformedValue {
        receiver: String,
        attribute: String,
        reason: String,
    },
}
