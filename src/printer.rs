// src/printer.rs - Printer engine: connection/print state machine and operator facade
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::communication::{Command, CommandQueue, EventBus, EventSubscriber, PrinterEvent};
use crate::config::PrinterConfig;
use crate::file_manager::UploadRecord;
use crate::gcode::{self, macros, Axis, GCodeError, GCodeStreamer};
use crate::hardware::serial::LineSink;
use crate::hardware::temperature::{self, Telemetry};
use crate::print_job::{PrintJob, Progress};

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("Printer is {0}, a print can only start when ready")]
    NotReady(PrinterStatus),
    #[error("GCode error: {0}")]
    GCode(#[from] GCodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Disconnected,
    Connecting,
    Ready,
    Printing,
    Pausing,
    Paused,
    Stopping,
    Completed,
}

impl PrinterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PrinterStatus::Disconnected => "disconnected",
            PrinterStatus::Connecting => "connecting",
            PrinterStatus::Ready => "ready",
            PrinterStatus::Printing => "printing",
            PrinterStatus::Pausing => "pausing",
            PrinterStatus::Paused => "paused",
            PrinterStatus::Stopping => "stopping",
            PrinterStatus::Completed => "completed",
        }
    }

    pub fn is_connected(self) -> bool {
        self != PrinterStatus::Disconnected
    }

    /// States in which the queue may hand the next command to the transport.
    pub fn allows_dispatch(self) -> bool {
        matches!(
            self,
            PrinterStatus::Ready | PrinterStatus::Printing | PrinterStatus::Completed
        )
    }

    pub fn can_transition_to(self, next: PrinterStatus) -> bool {
        use PrinterStatus::*;
        match (self, next) {
            (from, Disconnected) => from != Disconnected,
            (Disconnected, Connecting)
            | (Connecting, Ready)
            | (Ready, Printing)
            | (Printing, Pausing)
            | (Printing, Stopping)
            | (Printing, Completed)
            | (Pausing, Paused)
            | (Paused, Printing)
            | (Stopping, Ready)
            | (Completed, Ready) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined snapshot handed to new subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrinterInfo {
    pub status: PrinterStatus,
    pub progress: Progress,
    pub temperature: Telemetry,
}

/// The engine. Owns status, telemetry, progress, the command queue and the
/// transport write half; every method runs on the single owning task.
pub struct Printer {
    settings: PrinterConfig,
    status: PrinterStatus,
    queue: CommandQueue,
    transport: Option<Box<dyn LineSink>>,
    telemetry: Telemetry,
    progress: Progress,
    job: Option<PrintJob>,
    streamer: Option<GCodeStreamer>,
    events: EventBus,
}

impl Printer {
    pub fn new(settings: PrinterConfig) -> Self {
        let queue = CommandQueue::new(settings.window_size, settings.refill_threshold);
        Self {
            settings,
            status: PrinterStatus::Disconnected,
            queue,
            transport: None,
            telemetry: Telemetry::default(),
            progress: Progress::default(),
            job: None,
            streamer: None,
            events: EventBus::default(),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PrinterEvent> {
        self.events.subscribe()
    }

    pub fn subscriber(&self) -> EventSubscriber {
        self.events.subscriber()
    }

    pub fn status(&self) -> PrinterStatus {
        self.status
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    pub fn job(&self) -> Option<&PrintJob> {
        self.job.as_ref()
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn console(&self) -> Vec<String> {
        self.events.console()
    }

    pub fn info(&self) -> PrinterInfo {
        PrinterInfo {
            status: self.status,
            progress: self.progress,
            temperature: self.telemetry,
        }
    }

    pub fn handshake_delay(&self) -> Duration {
        self.settings.handshake_delay()
    }

    // --- transport lifecycle ---

    pub fn on_transport_opened(&mut self, sink: Box<dyn LineSink>) {
        if self.status.is_connected() {
            tracing::warn!("Transport reopened while {}", self.status);
        }
        self.transport = Some(sink);
        self.events.log("Port open.");
        self.transition(PrinterStatus::Connecting);
    }

    /// The settle delay after opening has passed: greet the firmware and go ready.
    pub fn on_handshake_elapsed(&mut self) {
        if self.status != PrinterStatus::Connecting {
            tracing::debug!("Handshake timer fired while {}, ignoring", self.status);
            return;
        }
        let handshake = self.settings.handshake_commands.iter().map(Command::new);
        self.queue.push_front_all(handshake);
        self.transition(PrinterStatus::Ready);
        self.pump();
    }

    pub fn on_transport_closed(&mut self) {
        if self.status == PrinterStatus::Disconnected {
            return;
        }
        if let Some(command) = self.queue.in_flight() {
            tracing::warn!("Discarding in-flight command '{}'", command.text);
        }
        self.transport = None;
        self.queue.clear();
        self.streamer = None;
        self.job = None;
        self.progress = Progress::default();
        self.telemetry.reset();
        self.events.log("Port closed.");
        self.transition(PrinterStatus::Disconnected);
    }

    /// Handles one line received from the firmware.
    pub fn on_line(&mut self, line: &str) {
        tracing::debug!(target: "serial_rx", "{}", line);

        if let Some(report) = temperature::parse_temperature_report(line) {
            self.telemetry.apply(&report);
            self.events.emit(PrinterEvent::Temperature(self.telemetry));
        }
        if temperature::is_console_noise(line) {
            return;
        }
        self.events.log(line);

        if line.trim_end() != self.settings.ack_token {
            return;
        }
        if self.queue.in_flight().is_none() {
            tracing::debug!("Acknowledgment with nothing in flight");
            return;
        }
        self.on_acknowledged();
    }

    fn on_acknowledged(&mut self) {
        self.queue.acknowledge();
        match self.status {
            PrinterStatus::Pausing => self.complete_pause(),
            PrinterStatus::Stopping => self.complete_stop(),
            _ => self.pump(),
        }
    }

    // --- flow control ---

    /// Queues a command and starts draining if the channel is idle.
    pub fn send(&mut self, command: Command) {
        if !self.status.is_connected() {
            tracing::warn!("Not connected, dropping '{}'", command.text);
            self.events.log(format!("not connected, dropping: {}", command.text));
            return;
        }
        if self.queue.push(command) {
            self.pump();
        }
    }

    pub fn send_all(&mut self, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            self.send(command);
        }
    }

    /// Pop and dispatch the head, then let the refill policy top the queue up.
    fn pump(&mut self) {
        if !self.status.allows_dispatch() {
            self.queue.hold();
            return;
        }
        if self.queue.in_flight().is_some() {
            self.refill();
            return;
        }
        if let Some(command) = self.queue.begin_next() {
            if !self.dispatch(command) {
                return;
            }
        }
        self.refill();
        if self.queue.in_flight().is_none() {
            if let Some(command) = self.queue.begin_next() {
                if !self.dispatch(command) {
                    return;
                }
            }
        }
        self.check_completion();
    }

    /// Writes the in-flight command. Returns false when the transport failed.
    fn dispatch(&mut self, command: Command) -> bool {
        tracing::debug!(target: "serial_tx", "{}", command);
        if let (Some(line), Some(job)) = (command.line, self.job.as_mut()) {
            job.last_written = line;
        }
        let result = match self.transport.as_mut() {
            Some(sink) => sink.write_line(&command.text),
            None => Err(crate::hardware::TransportError::Closed),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to write '{}': {}", command.text, e);
                self.on_transport_closed();
                false
            }
        }
    }

    /// Streams file lines into the queue once it drops below the refill threshold.
    fn refill(&mut self) {
        if self.status != PrinterStatus::Printing || !self.queue.needs_refill() {
            return;
        }
        let Some(streamer) = self.streamer.as_mut() else {
            return;
        };
        tracing::debug!("Reloading the queue...");
        let mut exhausted = false;
        while self.queue.has_room() {
            let Some(line) = streamer.next() else {
                exhausted = true;
                break;
            };
            let ordinal = line.ordinal;
            self.queue
                .push(Command::from_file_line(line.text, line.comment, ordinal));
            // lines re-streamed after a resume were already counted
            if ordinal <= self.progress.sent {
                continue;
            }
            self.progress.sent = ordinal;
            if ordinal == self.progress.total || self.queue.len() + 1 == self.queue.window_size() {
                self.events.emit(PrinterEvent::Progress(self.progress));
            }
        }
        if exhausted {
            tracing::info!("File completed");
            self.streamer = None;
        }
    }

    fn check_completion(&mut self) {
        if self.status != PrinterStatus::Printing
            || self.streamer.is_some()
            || !self.queue.is_empty()
            || self.queue.in_flight().is_some()
        {
            return;
        }
        self.transition(PrinterStatus::Completed);
        self.events.log("Print completed");
        self.reset_job();
        self.transition(PrinterStatus::Ready);
    }

    fn transition(&mut self, next: PrinterStatus) -> bool {
        if self.status == next {
            return false;
        }
        if !self.status.can_transition_to(next) {
            tracing::warn!("Ignoring illegal status change {} -> {}", self.status, next);
            return false;
        }
        tracing::info!("Printer status: {} -> {}", self.status, next);
        self.status = next;
        self.events.emit(PrinterEvent::Status(next));
        true
    }

    fn reset_job(&mut self) {
        self.queue.clear();
        self.streamer = None;
        self.job = None;
        self.progress = Progress::default();
    }

    // --- print lifecycle ---

    pub fn start_print(&mut self, path: &Path, upload: Option<UploadRecord>) -> Result<(), PrinterError> {
        if self.status != PrinterStatus::Ready {
            return Err(PrinterError::NotReady(self.status));
        }
        let total = gcode::count_lines(path)?;
        let streamer = GCodeStreamer::open(path, 0)?;
        tracing::info!("Printing {} ({} lines)", path.display(), total);

        self.job = Some(PrintJob::new(path, upload));
        self.streamer = Some(streamer);
        self.progress = Progress { sent: 0, total };
        self.events.log("Printing");
        self.transition(PrinterStatus::Printing);
        self.events.emit(PrinterEvent::Progress(self.progress));
        self.pump();
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.status != PrinterStatus::Printing {
            tracing::debug!("Pause ignored while {}", self.status);
            return;
        }
        self.transition(PrinterStatus::Pausing);
        if self.queue.in_flight().is_none() {
            self.complete_pause();
        }
    }

    fn complete_pause(&mut self) {
        let withdrawn = self.queue.withdraw_file_lines();
        self.queue.hold();
        self.streamer = None;
        if let Some(job) = self.job.as_mut() {
            job.resume_line = job.last_written;
            tracing::info!(
                "Paused after line {} ({} queued lines withdrawn)",
                job.resume_line,
                withdrawn
            );
        }
        self.events.log("Print paused");
        self.transition(PrinterStatus::Paused);
    }

    pub fn resume(&mut self) -> Result<(), PrinterError> {
        if self.status != PrinterStatus::Paused {
            tracing::debug!("Resume ignored while {}", self.status);
            return Ok(());
        }
        let Some(job) = self.job.as_ref() else {
            tracing::warn!("Paused without a print job, returning to ready");
            self.transition(PrinterStatus::Printing);
            self.check_completion();
            return Ok(());
        };
        let streamer = GCodeStreamer::open(&job.file_path, job.resume_line)?;
        self.streamer = Some(streamer);
        self.events.log("Print resumed");
        self.transition(PrinterStatus::Printing);
        self.pump();
        Ok(())
    }

    /// Cancels the running print once the in-flight command is acknowledged.
    pub fn stop(&mut self) {
        if self.status != PrinterStatus::Printing {
            tracing::debug!("Stop ignored while {}", self.status);
            return;
        }
        self.transition(PrinterStatus::Stopping);
        if self.queue.in_flight().is_none() {
            self.complete_stop();
        }
    }

    fn complete_stop(&mut self) {
        self.reset_job();
        self.events.log("Print stopped");
        self.transition(PrinterStatus::Ready);
        self.events.emit(PrinterEvent::Progress(self.progress));
    }

    // --- manual control ---

    pub fn home_xy(&mut self) {
        self.events.log("moving XY home");
        self.send_all(macros::home_xy());
    }

    pub fn home_z(&mut self) {
        self.events.log("moving Z home");
        self.send_all(macros::home_z());
    }

    pub fn jog(&mut self, axis: Axis, distance: f64) {
        self.events
            .log(format!("moving {} {}", distance.abs(), axis.describe(distance)));
        self.send_all(macros::jog(axis, distance, self.settings.jog_feedrate));
    }

    pub fn fan_on(&mut self, speed: u8) {
        self.events
            .log(format!("turning fan on with a speed of {}", speed));
        self.send_all(macros::fan_on(speed));
    }

    pub fn fan_off(&mut self) {
        self.events.log("turning fan off");
        self.send_all(macros::fan_off());
    }

    pub fn extrude(&mut self, length: f64) {
        self.events.log(format!("extruding {}", length));
        self.send_all(macros::extrude(length));
    }

    pub fn retract(&mut self, length: f64) {
        self.events.log(format!("retracting {}", length.abs()));
        self.send_all(macros::extrude(-length.abs()));
    }

    /// Updates the local setpoint right away, ahead of the firmware confirming it.
    pub fn set_hotend_temperature(&mut self, target: i32) {
        self.telemetry.hotend.set = target;
        self.events.emit(PrinterEvent::Temperature(self.telemetry));
        self.events
            .log(format!("set hotend temperature to {}", target));
        self.send_all(macros::set_hotend_temperature(target));
    }

    pub fn set_heatbed_temperature(&mut self, target: i32) {
        self.telemetry.heatbed.set = target;
        self.events.emit(PrinterEvent::Temperature(self.telemetry));
        self.events
            .log(format!("set heatbed temperature to {}", target));
        self.send_all(macros::set_heatbed_temperature(target));
    }

    /// Raw passthrough. A trailing `;comment` is kept as the command comment.
    pub fn send_raw(&mut self, raw: &str) {
        let (text, comment) = gcode::split_line(raw);
        if text.trim().is_empty() {
            tracing::debug!("Ignoring blank raw command");
            return;
        }
        self.events.log(format!("sending: {}", text.trim()));
        self.send(Command::with_comment(text.trim(), comment.map(str::to_string)));
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("status", &self.status)
            .field("progress", &self.progress)
            .field("telemetry", &self.telemetry)
            .field("queued", &self.queue.len())
            .field("job", &self.job)
            .finish()
    }
}
