//! Contains the data models for API requests and responses.
//!
//! Request bodies take every field as optional so that a missing field is
//! reported as `ER_MISSING_PARAMS` rather than a generic deserialisation error.

use super::printer_channel::{PrinterCommand, RequestError};
use crate::gcode::Axis;
use crate::printer::PrinterStatus;
use serde::{Deserialize, Serialize};

fn required<T>(value: Option<T>, name: &str) -> Result<T, RequestError> {
    value.ok_or_else(|| RequestError::MissingParams(name.to_string()))
}

fn finite(value: f64, name: &str) -> Result<f64, RequestError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RequestError::InvalidParams(format!("{} must be a finite number", name)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PrintRequest {
    pub upload_id: Option<u64>,
}

impl PrintRequest {
    pub fn upload_id(&self) -> Result<u64, RequestError> {
        required(self.upload_id, "upload_id")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeRequest {
    /// `"xy"` or `"z"`.
    pub axes: Option<String>,
}

impl TryFrom<HomeRequest> for PrinterCommand {
    type Error = RequestError;

    fn try_from(req: HomeRequest) -> Result<Self, Self::Error> {
        let axes = required(req.axes, "axes")?;
        match axes.trim().to_ascii_lowercase().as_str() {
            "xy" => Ok(PrinterCommand::HomeXy),
            "z" => Ok(PrinterCommand::HomeZ),
            other => Err(RequestError::InvalidParams(format!("cannot home '{}'", other))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct JogRequest {
    pub axis: Option<String>,
    pub distance: Option<f64>,
}

impl TryFrom<JogRequest> for PrinterCommand {
    type Error = RequestError;

    fn try_from(req: JogRequest) -> Result<Self, Self::Error> {
        let axis: Axis = required(req.axis, "axis")?
            .parse()
            .map_err(RequestError::InvalidParams)?;
        let distance = finite(required(req.distance, "distance")?, "distance")?;
        Ok(PrinterCommand::Jog { axis, distance })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FanRequest {
    pub speed: Option<i64>,
}

impl TryFrom<FanRequest> for PrinterCommand {
    type Error = RequestError;

    fn try_from(req: FanRequest) -> Result<Self, Self::Error> {
        let speed = required(req.speed, "speed")?;
        let speed = u8::try_from(speed)
            .map_err(|_| RequestError::InvalidParams(format!("fan speed {} is outside 0-255", speed)))?;
        Ok(PrinterCommand::FanOn { speed })
    }
}

/// Body shared by extrude and retract.
#[derive(Debug, Default, Deserialize)]
pub struct LengthRequest {
    pub length: Option<f64>,
}

impl LengthRequest {
    pub fn length(self) -> Result<f64, RequestError> {
        let length = finite(required(self.length, "length")?, "length")?;
        if length < 0.0 {
            return Err(RequestError::InvalidParams("length must not be negative".to_string()));
        }
        Ok(length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heater {
    Hotend,
    Heatbed,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemperatureRequest {
    pub heater: Option<Heater>,
    pub temperature: Option<f64>,
}

impl TryFrom<TemperatureRequest> for PrinterCommand {
    type Error = RequestError;

    fn try_from(req: TemperatureRequest) -> Result<Self, Self::Error> {
        let heater = required(req.heater, "heater")?;
        let temperature = finite(required(req.temperature, "temperature")?, "temperature")?;
        if !(0.0..=400.0).contains(&temperature) {
            return Err(RequestError::InvalidParams(format!(
                "temperature {} is outside 0-400",
                temperature
            )));
        }
        let temperature = temperature as i32;
        Ok(match heater {
            Heater::Hotend => PrinterCommand::SetHotend { temperature },
            Heater::Heatbed => PrinterCommand::SetHeatbed { temperature },
        })
    }
}

/// Represents a request to execute a G-code command.
#[derive(Debug, Default, Deserialize)]
pub struct GcodeCommandRequest {
    pub command: Option<String>,
}

impl TryFrom<GcodeCommandRequest> for PrinterCommand {
    type Error = RequestError;

    fn try_from(req: GcodeCommandRequest) -> Result<Self, Self::Error> {
        let command = required(req.command, "command")?;
        if command.trim().is_empty() {
            return Err(RequestError::MissingParams("command".to_string()));
        }
        Ok(PrinterCommand::Raw { command })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl From<&RequestError> for ErrorBody {
    fn from(err: &RequestError) -> Self {
        Self {
            error: ErrorDetail {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: PrinterStatus,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct ConsoleResponse {
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PortsResponse {
    pub ports: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_reported_by_name() {
        let err = PrinterCommand::try_from(JogRequest { axis: Some("x".into()), distance: None }).unwrap_err();
        assert_eq!(err, RequestError::MissingParams("distance".into()));
        assert_eq!(err.code(), "ER_MISSING_PARAMS");
    }

    #[test]
    fn jog_parses_axis() {
        let cmd = PrinterCommand::try_from(JogRequest { axis: Some("Y".into()), distance: Some(-5.0) }).unwrap();
        assert_eq!(cmd, PrinterCommand::Jog { axis: Axis::Y, distance: -5.0 });
    }

    #[test]
    fn fan_speed_out_of_range_is_invalid() {
        let err = PrinterCommand::try_from(FanRequest { speed: Some(300) }).unwrap_err();
        assert_eq!(err.code(), "ER_INVALID_PARAMS");
        assert_eq!(
            PrinterCommand::try_from(FanRequest { speed: Some(128) }).unwrap(),
            PrinterCommand::FanOn { speed: 128 }
        );
    }

    #[test]
    fn temperature_selects_heater() {
        let req: TemperatureRequest = serde_json::from_str(r#"{"heater":"heatbed","temperature":60}"#).unwrap();
        assert_eq!(PrinterCommand::try_from(req).unwrap(), PrinterCommand::SetHeatbed { temperature: 60 });
    }

    #[test]
    fn blank_command_is_missing() {
        let err = PrinterCommand::try_from(GcodeCommandRequest { command: Some("  ".into()) }).unwrap_err();
        assert_eq!(err.code(), "ER_MISSING_PARAMS");
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody::from(&RequestError::UploadNotFound(9));
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["error"]["code"], "ER_UPLOAD_NOT_FOUND");
        assert_eq!(json["error"]["message"], "Upload 9 not found");
    }
}
