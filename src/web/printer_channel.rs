//! Defines the communication channel messages between the web server and the printer task.

use crate::file_manager::UploadRecord;
use crate::gcode::Axis;
use crate::printer::{PrinterError, PrinterInfo};
use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors surfaced to callers of the printer task, each with a stable code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Missing parameter: {0}")]
    MissingParams(String),
    #[error("Invalid parameter: {0}")]
    InvalidParams(String),
    #[error("Upload {0} not found")]
    UploadNotFound(u64),
    #[error("{0}")]
    NotReady(String),
    #[error("{0}")]
    Internal(String),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::MissingParams(_) => "ER_MISSING_PARAMS",
            RequestError::InvalidParams(_) => "ER_INVALID_PARAMS",
            RequestError::UploadNotFound(_) => "ER_UPLOAD_NOT_FOUND",
            RequestError::NotReady(_) => "ER_NOT_READY",
            RequestError::Internal(_) => "ER_INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::MissingParams(_) | RequestError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            RequestError::UploadNotFound(_) => StatusCode::NOT_FOUND,
            RequestError::NotReady(_) => StatusCode::CONFLICT,
            RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PrinterError> for RequestError {
    fn from(err: PrinterError) -> Self {
        match err {
            PrinterError::NotReady(_) => RequestError::NotReady(err.to_string()),
            PrinterError::GCode(_) => RequestError::Internal(err.to_string()),
        }
    }
}

/// Every operation the printer task accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterCommand {
    Info,
    Console,
    ListPorts,
    Connect,
    Print {
        path: PathBuf,
        upload: Option<UploadRecord>,
    },
    Pause,
    Resume,
    Stop,
    HomeXy,
    HomeZ,
    Jog { axis: Axis, distance: f64 },
    FanOn { speed: u8 },
    FanOff,
    Extrude { length: f64 },
    Retract { length: f64 },
    SetHotend { temperature: i32 },
    SetHeatbed { temperature: i32 },
    Raw { command: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrinterReply {
    Info(PrinterInfo),
    Console(Vec<String>),
    Ports(Vec<String>),
    Done,
}

/// Represents a request sent from a web handler to the main printer task.
#[derive(Debug)]
pub struct PrinterRequest {
    pub command: PrinterCommand,
    /// The channel to send the response back on.
    pub respond_to: oneshot::Sender<Result<PrinterReply, RequestError>>,
}

/// Cloneable sending side of the printer task.
#[derive(Debug, Clone)]
pub struct PrinterClient {
    sender: mpsc::Sender<PrinterRequest>,
}

impl PrinterClient {
    pub fn new(sender: mpsc::Sender<PrinterRequest>) -> Self {
        Self { sender }
    }

    pub async fn request(&self, command: PrinterCommand) -> Result<PrinterReply, RequestError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PrinterRequest { command, respond_to })
            .await
            .map_err(|_| RequestError::Internal("printer task is not running".to_string()))?;
        response
            .await
            .map_err(|_| RequestError::Internal("printer task dropped the request".to_string()))?
    }

    pub async fn info(&self) -> Result<PrinterInfo, RequestError> {
        match self.request(PrinterCommand::Info).await? {
            PrinterReply::Info(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }
}

pub(crate) fn unexpected(reply: PrinterReply) -> RequestError {
    RequestError::Internal(format!("unexpected reply from printer task: {:?}", reply))
}
