//! Host-side engine for driving a Marlin-style 3D printer over a serial line.
//!
//! The [`printer::Printer`] engine owns the connection/print state machine and
//! paces commands one acknowledgment at a time. [`host::PrinterHost`] runs it on
//! a single task and [`web`] exposes it over HTTP.

pub mod communication;
pub mod config;
pub mod file_manager;
pub mod gcode;
pub mod hardware;
pub mod host;
pub mod print_job;
pub mod printer;
pub mod web;

pub use communication::{Command, CommandQueue, EventBus, EventSubscriber, PrinterEvent};
pub use host::PrinterHost;
pub use print_job::{PrintJob, Progress};
pub use printer::{Printer, PrinterError, PrinterInfo, PrinterStatus};
