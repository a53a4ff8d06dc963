//! Live synchronization - polling, command dispatch and the viewer engine

mod cache;
mod console;
mod engine;
mod poller;

pub use cache::{Offer, SnapshotCache};
pub use console::{CommandConsole, CommandError};
pub use engine::{create_engine_channels, FrameSink, ViewerEngine, ViewerTarget};
pub use poller::{ControlPoller, PollerCommand, PollerHandle, PollerStatus};

use crate::projection::Key;

/// Commands that can be sent to the viewer engine
#[derive(Debug, Clone)]
pub enum ViewerCommand {
    /// Local keyboard input
    Key(Key),
    /// Shutdown the engine
    Shutdown,
}

/// Status updates from the viewer engine
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerStatus {
    /// Resolving the configuration and loading slides
    Loading,
    /// No configuration for the requested identifier
    NotConfigured(String),
    /// A new frame was rendered
    Showing {
        slide_index: u32,
        production_index: u32,
        live: bool,
    },
    /// An error occurred
    Error(String),
    Stopped,
}
