//! Turns one tick's nested step input into a flat list of parsed messages.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::MessageError;
use super::classify::classify_value;
use super::types::{MessageContent, ParsedMessage};
use crate::config::ParserConfig;

/// Step input shape: `receiver -> attribute label -> sender -> value`.
pub type RawInputMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>;

/// Outcome of parsing one raw input map.
///
/// A rejected value never aborts the rest of the batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedInput {
    pub messages: Vec<ParsedMessage>,
    pub rejected: Vec<MessageError>,
}

impl ParsedInput {
    /// Returns true if nothing was classified or rejected.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.rejected.is_empty()
    }

    /// Fails on the first rejected value, otherwise yields the messages.
    ///
    /// # Errors
    ///
    /// - `MessageError` - First value the classifier rejected
    pub fn into_result(self) -> Result<Vec<ParsedMessage>, MessageError> {
        match self.rejected.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.messages),
        }
    }
}

/// Stateless classifier for raw step inputs.
#[derive(Debug, Clone)]
pub struct MessageParser {
    qualifier_prefix: String,
}

impl MessageParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            qualifier_prefix: format!("{}.", config.host_qualifier),
        }
    }

    /// Strips the host qualification prefix from a sender id.
    pub fn normalize_sender<'a>(&self, sender: &'a str) -> &'a str {
        sender
            .strip_prefix(self.qualifier_prefix.as_str())
            .unwrap_or(sender)
    }

    /// Classifies every `(receiver, label, sender, value)` of the map.
    ///
    /// Output order follows the map's key order.
    pub fn parse(&self, raw: &RawInputMap) -> ParsedInput {
        let mut parsed = ParsedInput::default();

        for (receiver, attributes) in raw {
            for (label, senders) in attributes {
                for (sender, value) in senders {
                    match classify_value(receiver, label, value) {
                        Ok(content) => parsed.messages.push(ParsedMessage::new(
                            receiver.clone(),
                            Some(self.normalize_sender(sender).to_string()),
                            self.normalize_content(content),
                        )),
                        Err(error) => {
                            warn!(%receiver, attribute = %label, %sender, %error, "Rejected step input");
                            parsed.rejected.push(error);
                        }
                    }
                }
            }
        }

        debug!(
            messages = parsed.messages.len(),
            rejected = parsed.rejected.len(),
            "Parsed step input"
        );
        parsed
    }

    /// Parses a JSON value of the step input shape.
    ///
    /// # Errors
    ///
    /// - `MessageError::MalformedValue` - Value is not a three-level nested object
    pub fn parse_json(&self, value: Value) -> Result<ParsedInput, MessageError> {
        let raw: RawInputMap =
            serde_json::from_value(value).map_err(|e| MessageError::MalformedValue {
                receiver: String::new(),
                attribute: String::new(),
                reason: e.to_string(),
            })?;
        Ok(self.parse(&raw))
    }

    fn normalize_content(&self, content: MessageContent) -> MessageContent {
        match content {
            MessageContent::FlexRequest { target } => MessageContent::FlexRequest {
                target: self.normalize_sender(&target).to_string(),
            },
            MessageContent::FlexOptions(options) => MessageContent::FlexOptions(
                options
                    .into_iter()
                    .map(|mut option| {
                        option.sender = self.normalize_sender(&option.sender).to_string();
                        option
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}
