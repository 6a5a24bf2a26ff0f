// src/communication/mod.rs - Flow control and event fan-out between the engine and its peers
pub mod event_system;
pub mod queue;

pub use event_system::{EventBus, EventSubscriber, PrinterEvent};
pub use queue::{Command, CommandQueue};
