//! Command definitions and execution
//!
//! This module handles:
//! - The named command catalog with feature ownership
//! - The built-in fan command table
//! - Sending one command through the transport and shaping the result

pub mod catalog;
mod executor;
mod registry;
mod result;

pub use executor::CommandExecutor;
pub use registry::{CommandRegistry, DeviceCommandTable};
pub use result::CommandResult;
