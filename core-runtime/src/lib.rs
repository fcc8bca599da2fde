//! # Runtime Module
//!
//! Ambient runtime services shared by the Review Platform Core crates:
//! the typed event bus and logging initialization.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, PlaylistEvent, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
