//! Defines the Axum API routes and handlers.

use crate::communication::{EventSubscriber, PrinterEvent};
use crate::file_manager::UploadStore;
use crate::hardware::Telemetry;
use crate::print_job::Progress;
use crate::web::models::{
    AcceptedResponse, ConsoleResponse, ErrorBody, FanRequest, GcodeCommandRequest, HomeRequest,
    JogRequest, LengthRequest, PortsResponse, PrintRequest, StatusResponse, TemperatureRequest,
};
use crate::web::printer_channel::{unexpected, PrinterClient, PrinterCommand, PrinterReply, RequestError};
use crate::printer::PrinterInfo;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Clone)]
pub struct AppState {
    pub printer: PrinterClient,
    pub uploads: Arc<dyn UploadStore>,
    pub events: EventSubscriber,
}

type ApiResult<T> = Result<Json<T>, RequestError>;

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody::from(&self))).into_response()
    }
}

/// JSON request body whose failures use the API error shape. An empty body
/// reads as `{}`, so the missing field is reported by name.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| RequestError::InvalidParams(e.body_text()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiJson(T::default()));
        }
        serde_json::from_slice(&body)
            .map(ApiJson)
            .map_err(|e| RequestError::InvalidParams(format!("malformed request body: {}", e)))
    }
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/printer/info", get(get_info))
        .route("/api/v1/printer/status", get(get_status))
        .route("/api/v1/printer/progress", get(get_progress))
        .route("/api/v1/printer/temperature", get(get_temperature).post(set_temperature))
        .route("/api/v1/printer/console", get(get_console))
        .route("/api/v1/printer/print", post(start_print))
        .route("/api/v1/printer/pause", post(pause))
        .route("/api/v1/printer/resume", post(resume))
        .route("/api/v1/printer/cancel", post(cancel))
        .route("/api/v1/printer/home", post(home))
        .route("/api/v1/printer/jog", post(jog))
        .route("/api/v1/printer/fan", post(fan_on))
        .route("/api/v1/printer/fan/off", post(fan_off))
        .route("/api/v1/printer/extrude", post(extrude))
        .route("/api/v1/printer/retract", post(retract))
        .route("/api/v1/printer/command", post(execute_gcode))
        .route("/api/v1/printer/connect", post(connect))
        .route("/api/v1/ports", get(list_ports))
        .route("/api/v1/events", get(events))
        .with_state(state)
}

async fn accepted(state: &AppState, command: PrinterCommand) -> ApiResult<AcceptedResponse> {
    state.printer.request(command).await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

async fn get_info(State(state): State<AppState>) -> ApiResult<PrinterInfo> {
    Ok(Json(state.printer.info().await?))
}

async fn get_status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let info = state.printer.info().await?;
    Ok(Json(StatusResponse { status: info.status }))
}

async fn get_progress(State(state): State<AppState>) -> ApiResult<Progress> {
    Ok(Json(state.printer.info().await?.progress))
}

async fn get_temperature(State(state): State<AppState>) -> ApiResult<Telemetry> {
    Ok(Json(state.printer.info().await?.temperature))
}

async fn get_console(State(state): State<AppState>) -> ApiResult<ConsoleResponse> {
    match state.printer.request(PrinterCommand::Console).await? {
        PrinterReply::Console(lines) => Ok(Json(ConsoleResponse { lines })),
        other => Err(unexpected(other)),
    }
}

async fn list_ports(State(state): State<AppState>) -> ApiResult<PortsResponse> {
    match state.printer.request(PrinterCommand::ListPorts).await? {
        PrinterReply::Ports(ports) => Ok(Json(PortsResponse { ports })),
        other => Err(unexpected(other)),
    }
}

async fn connect(State(state): State<AppState>) -> ApiResult<PrinterInfo> {
    match state.printer.request(PrinterCommand::Connect).await? {
        PrinterReply::Info(info) => Ok(Json(info)),
        other => Err(unexpected(other)),
    }
}

/// Resolves the upload and starts printing its file.
async fn start_print(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PrintRequest>,
) -> ApiResult<AcceptedResponse> {
    let id = payload.upload_id()?;
    let upload = state
        .uploads
        .find(id)
        .await
        .map_err(|e| RequestError::Internal(e.to_string()))?
        .ok_or(RequestError::UploadNotFound(id))?;
    tracing::info!("Print requested for upload {} ({})", id, upload.record.name);
    let command = PrinterCommand::Print {
        path: upload.path,
        upload: Some(upload.record),
    };
    accepted(&state, command).await
}

async fn pause(State(state): State<AppState>) -> ApiResult<AcceptedResponse> {
    accepted(&state, PrinterCommand::Pause).await
}

async fn resume(State(state): State<AppState>) -> ApiResult<AcceptedResponse> {
    accepted(&state, PrinterCommand::Resume).await
}

async fn cancel(State(state): State<AppState>) -> ApiResult<AcceptedResponse> {
    accepted(&state, PrinterCommand::Stop).await
}

async fn home(State(state): State<AppState>, ApiJson(payload): ApiJson<HomeRequest>) -> ApiResult<AcceptedResponse> {
    accepted(&state, payload.try_into()?).await
}

async fn jog(State(state): State<AppState>, ApiJson(payload): ApiJson<JogRequest>) -> ApiResult<AcceptedResponse> {
    accepted(&state, payload.try_into()?).await
}

async fn fan_on(State(state): State<AppState>, ApiJson(payload): ApiJson<FanRequest>) -> ApiResult<AcceptedResponse> {
    accepted(&state, payload.try_into()?).await
}

async fn fan_off(State(state): State<AppState>) -> ApiResult<AcceptedResponse> {
    accepted(&state, PrinterCommand::FanOff).await
}

async fn extrude(State(state): State<AppState>, ApiJson(payload): ApiJson<LengthRequest>) -> ApiResult<AcceptedResponse> {
    let length = payload.length()?;
    accepted(&state, PrinterCommand::Extrude { length }).await
}

async fn retract(State(state): State<AppState>, ApiJson(payload): ApiJson<LengthRequest>) -> ApiResult<AcceptedResponse> {
    let length = payload.length()?;
    accepted(&state, PrinterCommand::Retract { length }).await
}

async fn set_temperature(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TemperatureRequest>,
) -> ApiResult<AcceptedResponse> {
    accepted(&state, payload.try_into()?).await
}

/// Handler to execute a single raw G-code command.
async fn execute_gcode(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<GcodeCommandRequest>,
) -> ApiResult<AcceptedResponse> {
    accepted(&state, payload.try_into()?).await
}

/// Server-sent events: an `info` snapshot first, then every engine event as it happens.
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.events.subscribe();
    let snapshot = state.printer.info().await.ok();

    let stream = async_stream::stream! {
        if let Some(info) = snapshot {
            if let Ok(event) = Event::default().event("info").json_data(info) {
                yield Ok(event);
            }
        }
        loop {
            match receiver.recv().await {
                Ok(printer_event) => match to_sse(&printer_event) {
                    Ok(event) => {
                        yield Ok(event);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode {} event: {}", printer_event.name(), e);
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &PrinterEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}
