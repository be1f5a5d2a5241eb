//! Line-oriented gateway transport over TCP (ser2net) or a local serial port

use crate::transport::traits::Transport;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ramses_shared::{FrameDecoder, Packet, Verb};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Default baud rate for evofw3 / HGI80 sticks
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes encoded packets to a RAMSES-II gateway
///
/// The read half is drained by a background task that logs echoed and
/// received packets; nothing waits on replies.
pub struct GatewayTransport {
    name: &'static str,
    gateway_id: String,
    writer: Mutex<BoxedWriter>,
    reader: JoinHandle<()>,
}

impl GatewayTransport {
    /// Wrap an already-open byte stream
    pub fn new<S>(stream: S, name: &'static str, gateway_id: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = tokio::spawn(read_loop(name, read_half));

        Self {
            name,
            gateway_id: gateway_id.into(),
            writer: Mutex::new(Box::new(write_half)),
            reader,
        }
    }

    /// Connect to a gateway exposed over TCP
    pub async fn connect_tcp(address: &str, gateway_id: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("connecting to gateway at {address}"))?;
        stream.set_nodelay(true)?;

        info!("[GATEWAY] Connected to {}", address);
        Ok(Self::new(stream, "TCP", gateway_id))
    }

    /// Open a gateway attached to a local serial port
    pub fn open_serial(path: &str, baud_rate: u32, gateway_id: impl Into<String>) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .map_err(|e| anyhow!("opening serial port {}: {}", path, e))?;

        info!("[GATEWAY] Opened {} at {} baud", path, baud_rate);
        Ok(Self::new(port, "Serial", gateway_id))
    }
}

impl Drop for GatewayTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn send_packet(
        &self,
        device_id: &str,
        verb: Verb,
        code: &str,
        payload: &str,
        from_id: Option<&str>,
    ) -> Result<()> {
        let src = from_id.unwrap_or(&self.gateway_id);
        let packet = Packet::new(verb, src, device_id, code, payload);
        let frame = packet.encode()?;

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;

        debug!("[GATEWAY] -> {}", packet.to_line());
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

async fn read_loop<S>(name: &'static str, mut read_half: ReadHalf<S>)
where
    S: AsyncRead + AsyncWrite,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 1024];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                warn!("[GATEWAY] {} gateway closed the connection", name);
                break;
            }
            Ok(n) => {
                decoder.extend(&buf[..n]);

                loop {
                    match decoder.decode_next() {
                        Ok(Some(packet)) => debug!("[GATEWAY] <- {}", packet.to_line()),
                        Ok(None) => break,
                        Err(e) => debug!("[GATEWAY] Ignoring line: {}", e),
                    }
                }
            }
            Err(e) => {
                warn!("[GATEWAY] {} read error: {}", name, e);
                break;
            }
        }
    }
}
