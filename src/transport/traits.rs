//! Transport trait abstraction for the RF packet sender

use anyhow::Result;
use async_trait::async_trait;
use ramses_shared::Verb;

/// Anything that can put a single packet on the air
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one packet to `device_id`
    ///
    /// `from_id` is the source address to transmit as; `None` means the
    /// transport's own address.
    async fn send_packet(
        &self,
        device_id: &str,
        verb: Verb,
        code: &str,
        payload: &str,
        from_id: Option<&str>,
    ) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
