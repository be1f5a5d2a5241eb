//! Uniform outcome of a command submission

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;

/// Result of submitting or executing a command
///
/// Both the immediate and the queued path hand one of these back; nothing
/// past the dispatcher boundary surfaces as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub response_data: Option<Map<String, Value>>,
    /// The command was accepted into a device queue and will be sent later
    pub queued: bool,
    #[serde(serialize_with = "as_secs_f64")]
    pub execution_time: Duration,
}

impl CommandResult {
    /// Command was sent successfully
    pub fn sent(execution_time: Duration) -> Self {
        Self {
            success: true,
            error_message: None,
            response_data: None,
            queued: false,
            execution_time,
        }
    }

    /// Command was accepted into a device queue
    pub fn queued() -> Self {
        Self {
            success: true,
            error_message: None,
            response_data: None,
            queued: true,
            execution_time: Duration::ZERO,
        }
    }

    /// Command failed
    pub fn failed(message: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            response_data: None,
            queued: false,
            execution_time,
        }
    }

    /// Command was never handed to the manager because its name is unknown
    pub fn not_found(name: &str) -> Self {
        Self::failed(format!("command not found: {name}"), Duration::ZERO)
    }
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
