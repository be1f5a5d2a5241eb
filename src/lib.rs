//! Rate-limited command dispatch for RAMSES-II ventilation devices
//!
//! Commands are looked up by name in a [`CommandRegistry`], given the source
//! address of the target's bound companion remote, and handed to the
//! [`DeviceCommandManager`], which keeps one FIFO per device and never sends
//! to the same device twice within the configured interval.

pub mod command;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod queue;
pub mod transport;

pub use command::{CommandRegistry, CommandResult};
pub use config::{ConfigError, DispatchConfig};
pub use directory::{DeviceDirectory, StaticDirectory};
pub use dispatcher::CommandDispatcher;
pub use queue::{CommandRequest, DeviceCommandManager, QueueStatistics};
pub use transport::Transport;

pub use ramses_shared::{CommandDefinition, Priority, Verb};
