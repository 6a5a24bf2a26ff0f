use crate::hardware::temperature::Telemetry;
use crate::print_job::Progress;
use crate::printer::PrinterStatus;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// Number of console lines kept for late subscribers.
pub const CONSOLE_HISTORY: usize = 50;
const DEFAULT_CAPACITY: usize = 256;

/// Everything the engine reports to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum PrinterEvent {
    Log(String),
    Progress(Progress),
    Status(PrinterStatus),
    Temperature(Telemetry),
}

impl PrinterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PrinterEvent::Log(_) => "log",
            PrinterEvent::Progress(_) => "progress",
            PrinterEvent::Status(_) => "status",
            PrinterEvent::Temperature(_) => "temperature",
        }
    }
}

/// Cloneable handle that lets collaborators subscribe without touching the engine.
#[derive(Debug, Clone)]
pub struct EventSubscriber {
    sender: broadcast::Sender<PrinterEvent>,
}

impl EventSubscriber {
    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.sender.subscribe()
    }
}

/// Event fan-out owned by one engine instance.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<PrinterEvent>,
    console: VecDeque<String>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            console: VecDeque::with_capacity(CONSOLE_HISTORY),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber(&self) -> EventSubscriber {
        EventSubscriber {
            sender: self.sender.clone(),
        }
    }

    pub fn emit(&mut self, event: PrinterEvent) {
        if let PrinterEvent::Log(line) = &event {
            if self.console.len() == CONSOLE_HISTORY {
                self.console.pop_front();
            }
            self.console.push_back(line.clone());
        }
        // no receivers is not an error, events are simply dropped
        let _ = self.sender.send(event);
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.emit(PrinterEvent::Log(message.into()));
    }

    pub fn console(&self) -> Vec<String> {
        self.console.iter().cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
