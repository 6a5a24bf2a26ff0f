//! The web module for handling the Axum API.
//! This file declares the other files in this directory as sub-modules.

pub mod api;
pub mod models;
pub mod printer_channel;

pub use api::{create_router, AppState};
pub use printer_channel::{PrinterClient, PrinterCommand, PrinterReply, PrinterRequest, RequestError};
