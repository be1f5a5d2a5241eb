//! RAMSES Shared Protocol Types
//!
//! This crate provides the protocol types and packet codec shared by every
//! component that talks to RF-addressable ventilation devices through a
//! RAMSES-II gateway.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use codec::{FrameDecoder, Packet, ProtocolError};

/// Timing parameters for command dispatch
pub mod timing {
    /// Minimum gap between two sends to the same device
    pub const MIN_COMMAND_INTERVAL_MS: u64 = 500;

    /// Upper bound accepted for the per-device interval
    pub const MAX_COMMAND_INTERVAL_MS: u64 = 3_600_000;

    /// How long a device worker waits on an empty queue before retiring
    pub const WORKER_IDLE_TIMEOUT_MS: u64 = 10_000;

    /// Default per-command transport timeout
    pub const COMMAND_TIMEOUT_MS: u64 = 5_000;
}

/// Address the gateway itself transmits from when no companion is bound
pub const DEFAULT_GATEWAY_ID: &str = "18:000730";

/// Packet verb as it appears on the wire (always two characters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    #[serde(rename = " I")]
    Info,
    #[serde(rename = "RQ")]
    Request,
    #[serde(rename = " W")]
    Write,
    /// Only ever received from devices, never sent
    #[serde(rename = "RP")]
    Reply,
}

impl Verb {
    /// Two-character wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Info => " I",
            Verb::Request => "RQ",
            Verb::Write => " W",
            Verb::Reply => "RP",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "I" => Ok(Verb::Info),
            "RQ" => Ok(Verb::Request),
            "W" => Ok(Verb::Write),
            "RP" => Ok(Verb::Reply),
            other => Err(ProtocolError::InvalidVerb(other.to_string())),
        }
    }
}

/// Command priority. Accepted everywhere but does not reorder queues yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// One device instruction: an immutable (code, verb, payload) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub code: String,
    pub verb: Verb,
    pub payload: String,
    #[serde(default)]
    pub description: String,
}

impl CommandDefinition {
    /// Create a new command definition
    pub fn new(code: impl Into<String>, verb: Verb, payload: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            verb,
            payload: payload.into(),
            description: String::new(),
        }
    }

    /// Attach a human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check code and payload against the wire format
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.verb == Verb::Reply {
            return Err(ProtocolError::InvalidVerb(self.verb.to_string()));
        }
        codec::validate_code(&self.code)?;
        codec::validate_payload(&self.payload)?;
        Ok(())
    }
}
