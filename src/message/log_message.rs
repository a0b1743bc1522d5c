//! LogMessage - the unit a source worker fills on every read

use crate::{SourceError, SourceResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Message produced by a source worker
///
/// The driver allocates an empty message before every read and the worker
/// fills it in `read_message`. Besides the message text a worker may attach
/// any number of name-value attributes (host, pid, program, journal fields...).
#[derive(Debug, Clone, Serialize)]
pub struct LogMessage {
    /// Message text
    message: String,
    /// Name-value attributes
    attributes: HashMap<String, String>,
    /// Reception time in microseconds since the epoch
    received_us: u64,
}

impl LogMessage {
    /// Create an empty message stamped with the current time
    pub fn new_empty() -> Self {
        let received_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();

        Self {
            message: String::new(),
            attributes: HashMap::new(),
            received_us,
        }
    }

    /// Create a message with the given text
    ///
    /// # Example
    /// ```
    /// use threaded_source_core::LogMessage;
    ///
    /// let msg = LogMessage::from_string("Server started").with_attribute("PROGRAM", "sshd");
    /// assert_eq!(msg.message(), "Server started");
    /// assert_eq!(msg.attribute("PROGRAM"), Some("sshd"));
    /// ```
    pub fn from_string(message: impl Into<String>) -> Self {
        let mut msg = Self::new_empty();
        msg.message = message.into();
        msg
    }

    /// Message text
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replace the message text
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Set an attribute, replacing any previous value
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Add multiple attributes
    pub fn with_attributes(mut self, attrs: HashMap<String, String>) -> Self {
        self.attributes.extend(attrs);
        self
    }

    /// Look up an attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// All attributes
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Reception time in microseconds since the epoch
    pub fn received_us(&self) -> u64 {
        self.received_us
    }

    /// Override the reception time, e.g. with the source's own timestamp
    pub fn set_received_us(&mut self, received_us: u64) {
        self.received_us = received_us;
    }

    /// Set a structured attribute, stored as its JSON text
    pub fn set_json_attribute<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> SourceResult<()> {
        let text =
            serde_json::to_string(value).map_err(|e| SourceError::Serialization(e.to_string()))?;
        self.set_attribute(key, text);
        Ok(())
    }

    /// Render the message as a JSON object
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "MESSAGE": self.message,
            "attributes": self.attributes,
            "received_us": self.received_us,
        })
    }
}

impl Default for LogMessage {
    fn default() -> Self {
        Self::new_empty()
    }
}
