// src/host.rs - The task that owns the printer engine
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::communication::EventSubscriber;
use crate::config::ConnectionConfig;
use crate::hardware::{Connector, TransportError, TransportEvent, TransportTasks};
use crate::printer::Printer;
use crate::web::printer_channel::{PrinterCommand, PrinterReply, PrinterRequest, RequestError};

enum Step {
    Transport(Option<TransportEvent>),
    Handshake,
    Request(Option<PrinterRequest>),
}

/// Single owner of the engine. Transport events, the handshake timer and
/// caller requests are handled one at a time, in arrival order.
pub struct PrinterHost {
    printer: Printer,
    connector: Arc<dyn Connector>,
    connection: ConnectionConfig,
    requests: mpsc::Receiver<PrinterRequest>,
    transport: Option<mpsc::Receiver<TransportEvent>>,
    writer: Option<mpsc::UnboundedSender<String>>,
    tasks: Option<TransportTasks>,
    handshake_at: Option<Instant>,
}

impl PrinterHost {
    pub fn new(
        printer: Printer,
        connector: Arc<dyn Connector>,
        connection: ConnectionConfig,
        requests: mpsc::Receiver<PrinterRequest>,
    ) -> Self {
        Self {
            printer,
            connector,
            connection,
            requests,
            transport: None,
            writer: None,
            tasks: None,
            handshake_at: None,
        }
    }

    pub fn subscriber(&self) -> EventSubscriber {
        self.printer.subscriber()
    }

    /// Opens the configured port, then serves until every request sender is dropped.
    pub async fn run(mut self) {
        if let Err(e) = self.connect().await {
            tracing::error!("Could not open printer connection: {}", e);
        }
        loop {
            let step = tokio::select! {
                event = next_transport_event(&mut self.transport) => Step::Transport(event),
                _ = handshake_timer(self.handshake_at) => Step::Handshake,
                request = self.requests.recv() => Step::Request(request),
            };
            match step {
                Step::Transport(event) => self.on_transport_event(event),
                Step::Handshake => {
                    self.handshake_at = None;
                    self.printer.on_handshake_elapsed();
                }
                Step::Request(Some(request)) => self.handle(request).await,
                Step::Request(None) => break,
            }
            self.release_dead_transport();
        }
        tracing::info!("Request channel closed, printer host stopping");
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.printer.status().is_connected() || self.transport.is_some() {
            tracing::debug!("Connection already open");
            return Ok(());
        }
        let handle = self
            .connector
            .open(&self.connection.port, self.connection.baud)
            .await?;
        tracing::info!("Connected to {}", handle.port);
        self.transport = Some(handle.events);
        self.writer = Some(handle.writer);
        self.tasks = Some(handle.tasks);
        Ok(())
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Opened) => match self.writer.take() {
                Some(writer) => {
                    self.printer.on_transport_opened(Box::new(writer));
                    self.handshake_at = Some(Instant::now() + self.printer.handshake_delay());
                }
                None => tracing::warn!("Duplicate open notification ignored"),
            },
            Some(TransportEvent::Line(line)) => self.printer.on_line(&line),
            Some(TransportEvent::Closed) | None => {
                self.transport = None;
                self.writer = None;
                self.tasks = None;
                self.handshake_at = None;
                self.printer.on_transport_closed();
            }
        }
    }

    /// The engine drops its sink on a failed write; stop listening to that connection too.
    fn release_dead_transport(&mut self) {
        if self.transport.is_some() && self.writer.is_none() && !self.printer.status().is_connected() {
            tracing::debug!("Releasing transport after write failure");
            self.transport = None;
            self.tasks = None;
            self.handshake_at = None;
        }
    }

    async fn handle(&mut self, request: PrinterRequest) {
        let PrinterRequest { command, respond_to } = request;
        tracing::debug!("Handling request {:?}", command);
        let result = self.execute(command).await;
        if let Err(e) = &result {
            tracing::warn!("Request failed: {}", e);
        }
        if respond_to.send(result).is_err() {
            tracing::debug!("Requester went away before the reply");
        }
    }

    async fn execute(&mut self, command: PrinterCommand) -> Result<PrinterReply, RequestError> {
        let printer = &mut self.printer;
        match command {
            PrinterCommand::Info => return Ok(PrinterReply::Info(printer.info())),
            PrinterCommand::Console => return Ok(PrinterReply::Console(printer.console())),
            PrinterCommand::ListPorts => {
                return Ok(PrinterReply::Ports(self.connector.available_ports()));
            }
            PrinterCommand::Connect => {
                self.connect()
                    .await
                    .map_err(|e| RequestError::Internal(e.to_string()))?;
                return Ok(PrinterReply::Info(self.printer.info()));
            }
            PrinterCommand::Print { path, upload } => printer.start_print(&path, upload)?,
            PrinterCommand::Pause => printer.pause(),
            PrinterCommand::Resume => printer.resume()?,
            PrinterCommand::Stop => printer.stop(),
            PrinterCommand::HomeXy => printer.home_xy(),
            PrinterCommand::HomeZ => printer.home_z(),
            PrinterCommand::Jog { axis, distance } => printer.jog(axis, distance),
            PrinterCommand::FanOn { speed } => printer.fan_on(speed),
            PrinterCommand::FanOff => printer.fan_off(),
            PrinterCommand::Extrude { length } => printer.extrude(length),
            PrinterCommand::Retract { length } => printer.retract(length),
            PrinterCommand::SetHotend { temperature } => printer.set_hotend_temperature(temperature),
            PrinterCommand::SetHeatbed { temperature } => printer.set_heatbed_temperature(temperature),
            PrinterCommand::Raw { command } => printer.send_raw(&command),
        }
        Ok(PrinterReply::Done)
    }
}

async fn next_transport_event(
    transport: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match transport {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn handshake_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
