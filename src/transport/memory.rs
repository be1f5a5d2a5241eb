//! In-memory transport that records sends instead of transmitting them

use crate::transport::traits::Transport;
use anyhow::{bail, Result};
use async_trait::async_trait;
use ramses_shared::{Packet, Verb};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// A send observed by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub device_id: String,
    pub verb: Verb,
    pub code: String,
    pub payload: String,
    pub from_id: Option<String>,
    /// When the send started
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Faults {
    codes: HashSet<String>,
    devices: HashSet<String>,
    delay: Duration,
}

/// Records every packet; can be told to fail or to respond slowly
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentPacket>>,
    faults: Mutex<Faults>,
    /// Gateway address to show in logged packets; `None` disables logging
    log_as: Option<String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log each packet at info level as it would appear on the wire
    pub fn logging(gateway_id: impl Into<String>) -> Self {
        Self {
            log_as: Some(gateway_id.into()),
            ..Self::default()
        }
    }

    /// Fail every send carrying this code
    pub async fn fail_code(&self, code: &str) {
        self.faults.lock().await.codes.insert(code.to_string());
    }

    /// Fail every send to this device
    pub async fn fail_device(&self, device_id: &str) {
        self.faults.lock().await.devices.insert(device_id.to_string());
    }

    /// Make each send take this long
    pub async fn set_delay(&self, delay: Duration) {
        self.faults.lock().await.delay = delay;
    }

    /// Every recorded send, in order (failed attempts included)
    pub async fn sent(&self) -> Vec<SentPacket> {
        self.sent.lock().await.clone()
    }

    /// Recorded sends to one device, in order
    pub async fn sent_to(&self, device_id: &str) -> Vec<SentPacket> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|p| p.device_id == device_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_packet(
        &self,
        device_id: &str,
        verb: Verb,
        code: &str,
        payload: &str,
        from_id: Option<&str>,
    ) -> Result<()> {
        self.sent.lock().await.push(SentPacket {
            device_id: device_id.to_string(),
            verb,
            code: code.to_string(),
            payload: payload.to_string(),
            from_id: from_id.map(str::to_string),
            at: Instant::now(),
        });

        if let Some(gateway_id) = &self.log_as {
            let src = from_id.unwrap_or(gateway_id);
            info!("[DRY-RUN] {}", Packet::new(verb, src, device_id, code, payload).to_line());
        }

        let (fail, delay) = {
            let faults = self.faults.lock().await;
            (
                faults.codes.contains(code) || faults.devices.contains(device_id),
                faults.delay,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            bail!("no acknowledgement from {} for {}", device_id, code);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
