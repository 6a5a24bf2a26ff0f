// src/gcode/mod.rs - G-code file streaming and manual command builders
pub mod macros;
pub mod streamer;

use std::path::PathBuf;
use thiserror::Error;

pub use macros::Axis;
pub use streamer::{count_lines, split_line, GCodeLine, GCodeStreamer};

#[derive(Debug, Error)]
pub enum GCodeError {
    #[error("Cannot read G-code file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
