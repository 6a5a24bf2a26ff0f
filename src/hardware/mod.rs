// src/hardware/mod.rs - Firmware facing pieces: serial transport and telemetry parsing
pub mod serial;
pub mod temperature;

pub use serial::{Connector, LineSink, SerialConnector, TransportError, TransportEvent, TransportHandle, TransportTasks};
pub use temperature::{HeaterReading, Telemetry, TemperatureReport};
