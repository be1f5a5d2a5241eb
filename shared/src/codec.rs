//! Line codec for the RAMSES-II gateway
//!
//! The gateway (evofw3 / HGI80 style USB stick, or a ser2net bridge in front
//! of one) takes and emits one packet per line:
//! ```text
//! RQ --- 18:000730 32:153289 --:------ 22F1 001 00
//! ```
//! Received lines may carry a leading 3-digit RSSI field.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Verb;

/// Longest line accepted from the gateway before the buffer is discarded
pub const MAX_LINE_LEN: usize = 512;

/// Placeholder for an unused address slot
pub const NULL_ADDRESS: &str = "--:------";

/// Errors that can occur while encoding or decoding packets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid verb: {0:?}")]
    InvalidVerb(String),

    #[error("Invalid code {0:?}: expected 4 hex digits")]
    InvalidCode(String),

    #[error("Invalid payload {0:?}: expected an even number of hex digits")]
    InvalidPayload(String),

    #[error("Invalid device address {0:?}")]
    InvalidAddress(String),

    #[error("Length field says {declared} bytes, payload has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Line too long: {0} bytes (max: {MAX_LINE_LEN})")]
    LineTooLong(usize),

    #[error("Malformed packet: {0}")]
    Malformed(String),
}

pub(crate) fn validate_code(code: &str) -> Result<(), ProtocolError> {
    if code.len() == 4 && code.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidCode(code.to_string()))
    }
}

pub(crate) fn validate_payload(payload: &str) -> Result<(), ProtocolError> {
    if payload.len() % 2 == 0 && payload.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidPayload(payload.to_string()))
    }
}

/// Check the `NN:NNNNNN` device address shape
pub fn validate_address(addr: &str) -> Result<(), ProtocolError> {
    let valid = addr == NULL_ADDRESS
        || (addr.len() == 9
            && addr.as_bytes()[2] == b':'
            && addr
                .char_indices()
                .all(|(i, c)| i == 2 || c.is_ascii_digit()));

    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidAddress(addr.to_string()))
    }
}

/// A single RAMSES-II packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub verb: Verb,
    pub src: String,
    pub dst: String,
    pub code: String,
    pub payload: String,
}

impl Packet {
    /// Build a packet from `src` to `dst`
    pub fn new(
        verb: Verb,
        src: impl Into<String>,
        dst: impl Into<String>,
        code: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            verb,
            src: src.into(),
            dst: dst.into(),
            code: code.into().to_ascii_uppercase(),
            payload: payload.into().to_ascii_uppercase(),
        }
    }

    /// Check every field against the wire format
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_address(&self.src)?;
        validate_address(&self.dst)?;
        validate_code(&self.code)?;
        validate_payload(&self.payload)?;
        Ok(())
    }

    /// Render the packet as it is written to the gateway (without line ending)
    pub fn to_line(&self) -> String {
        format!(
            "{} --- {} {} {} {} {:03} {}",
            self.verb,
            self.src,
            self.dst,
            NULL_ADDRESS,
            self.code,
            self.payload.len() / 2,
            self.payload
        )
    }

    /// Encode into a CRLF-terminated frame
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        self.validate()?;

        let line = self.to_line();
        let mut buf = BytesMut::with_capacity(line.len() + 2);
        buf.put_slice(line.as_bytes());
        buf.put_slice(b"\r\n");

        Ok(buf.freeze())
    }

    /// Parse one line received from the gateway
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut line = line.trim_end_matches(['\r', '\n']);

        // Optional RSSI prefix, e.g. "045  I --- ..."
        let bytes = line.as_bytes();
        if bytes.len() > 4 && bytes[..3].iter().all(u8::is_ascii_digit) && bytes[3] == b' ' {
            line = &line[4..];
        }

        let (Some(verb), Some(rest)) = (line.get(..2), line.get(2..)) else {
            return Err(ProtocolError::Malformed(line.to_string()));
        };
        let verb = verb.parse::<Verb>()?;

        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(ProtocolError::Malformed(line.to_string()));
        }

        // fields: seq, addr0, addr1, addr2, code, len, [payload]
        let (src, dst) = match (fields[1], fields[2], fields[3]) {
            (a0, NULL_ADDRESS, a2) => (a0, a2),
            (a0, a1, _) => (a0, a1),
        };
        let code = fields[4];
        let declared: usize = fields[5]
            .parse()
            .map_err(|_| ProtocolError::Malformed(format!("bad length field {:?}", fields[5])))?;
        let payload = fields.get(6).copied().unwrap_or("");

        if payload.len() / 2 != declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: payload.len() / 2,
            });
        }

        let packet = Packet::new(verb, src, dst, code, payload);
        packet.validate()?;
        Ok(packet)
    }
}

/// Decoder state machine for the gateway's line stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial line data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next packet from the buffer
    ///
    /// Returns:
    /// - `Ok(Some(packet))` if a complete line was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if a complete line was invalid (the line is consumed)
    pub fn decode_next(&mut self) -> Result<Option<Packet>, ProtocolError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LEN {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    return Err(ProtocolError::LineTooLong(len));
                }
                return Ok(None);
            };

            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end();

            // Blank lines and gateway comments ("# evofw3 0.7.1")
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            return Packet::parse(line).map(Some);
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
