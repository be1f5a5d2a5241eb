pub mod gateway;
pub mod memory;
pub mod traits;

pub use gateway::{GatewayTransport, DEFAULT_BAUD_RATE};
pub use memory::{MemoryTransport, SentPacket};
pub use traits::Transport;
