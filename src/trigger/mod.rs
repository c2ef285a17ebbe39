//! Trigger module for starting workflows from console input
//!
//! Stands in for a wake-word detector: each line typed while idle is parsed
//! as a [`TriggerCommand`].

mod command;
mod listener;

pub use command::{TriggerCommand, USAGE};
pub use listener::{ConsoleListener, TriggerError};
