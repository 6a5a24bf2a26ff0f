//! In-memory stand-ins for the serial port shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use marlin_host::config::{ConnectionConfig, PrinterConfig};
use marlin_host::hardware::{Connector, TransportError, TransportEvent, TransportHandle, TransportTasks};
use marlin_host::web::{PrinterClient, PrinterRequest};
use marlin_host::{Printer, PrinterEvent, PrinterHost, PrinterStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(2);

/// The firmware side of one opened connection.
pub struct MockDevice {
    pub events: mpsc::Sender<TransportEvent>,
    pub written: mpsc::UnboundedReceiver<String>,
    /// Resolves once the host has released this connection's tasks.
    pub released: oneshot::Receiver<()>,
}

impl MockDevice {
    pub async fn reply(&self, line: &str) {
        self.events
            .send(TransportEvent::Line(line.to_string()))
            .await
            .unwrap();
    }

    pub async fn close(&self) {
        self.events.send(TransportEvent::Closed).await.unwrap();
    }

    pub async fn next_written(&mut self) -> String {
        timeout(WAIT, self.written.recv())
            .await
            .expect("no command written in time")
            .expect("writer dropped")
    }

    /// Answers every command with `ok` until `count` commands were seen.
    pub async fn acknowledge(&mut self, count: usize) -> Vec<String> {
        let mut seen = Vec::with_capacity(count);
        for _ in 0..count {
            seen.push(self.next_written().await);
            self.reply("ok").await;
        }
        seen
    }
}

pub struct MockConnector {
    devices: mpsc::UnboundedSender<MockDevice>,
    fail: AtomicBool,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockDevice>) {
        let (devices, rx) = mpsc::unbounded_channel();
        (
            Self {
                devices,
                fail: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn failing() -> (Self, mpsc::UnboundedReceiver<MockDevice>) {
        let (connector, rx) = Self::new();
        connector.fail.store(true, Ordering::SeqCst);
        (connector, rx)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, port: &str, baud: u32) -> Result<TransportHandle, TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Open {
                port: port.to_string(),
                baud,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
            });
        }
        let (event_tx, event_rx) = mpsc::channel(64);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (alive, released) = oneshot::channel::<()>();
        let mut tasks = TransportTasks::new();
        tasks.push(tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        }));
        event_tx.send(TransportEvent::Opened).await.unwrap();
        let _ = self.devices.send(MockDevice {
            events: event_tx,
            written: writer_rx,
            released,
        });
        Ok(TransportHandle {
            port: port.to_string(),
            writer: writer_tx,
            events: event_rx,
            tasks,
        })
    }

    fn available_ports(&self) -> Vec<String> {
        vec!["/dev/ttyMOCK0".to_string()]
    }
}

pub fn fast_config() -> PrinterConfig {
    PrinterConfig {
        handshake_delay_ms: 10,
        ..PrinterConfig::default()
    }
}

pub struct RunningHost {
    pub client: PrinterClient,
    pub events: broadcast::Receiver<PrinterEvent>,
    pub subscriber: marlin_host::EventSubscriber,
    pub task: JoinHandle<()>,
}

pub fn spawn_host(connector: MockConnector) -> RunningHost {
    spawn_host_with(connector, fast_config())
}

pub fn spawn_host_with(connector: MockConnector, config: PrinterConfig) -> RunningHost {
    let (tx, rx) = mpsc::channel::<PrinterRequest>(16);
    let connection = ConnectionConfig {
        port: "/dev/ttyMOCK0".to_string(),
        baud: 115200,
    };
    let host = PrinterHost::new(Printer::new(config), Arc::new(connector), connection, rx);
    let subscriber = host.subscriber();
    let events = subscriber.subscribe();
    let task = tokio::spawn(host.run());
    RunningHost {
        client: PrinterClient::new(tx),
        events,
        subscriber,
        task,
    }
}

pub async fn wait_for_status(events: &mut broadcast::Receiver<PrinterEvent>, want: PrinterStatus) {
    timeout(WAIT, async {
        loop {
            if let Ok(PrinterEvent::Status(status)) = events.recv().await {
                if status == want {
                    return;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("status {} not reached", want));
}

pub async fn wait_for_log(events: &mut broadcast::Receiver<PrinterEvent>, want: &str) {
    timeout(WAIT, async {
        loop {
            if let Ok(PrinterEvent::Log(line)) = events.recv().await {
                if line == want {
                    return;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("log line '{}' not seen", want));
}

/// Waits until the host has aborted the connection's background tasks.
pub async fn wait_for_released(device: &mut MockDevice) {
    let result = timeout(WAIT, &mut device.released)
        .await
        .expect("connection tasks still running");
    assert!(result.is_err());
}

/// Opens the connection and completes the handshake.
pub async fn connect_ready(devices: &mut mpsc::UnboundedReceiver<MockDevice>) -> MockDevice {
    let mut device = timeout(WAIT, devices.recv())
        .await
        .expect("connector not used")
        .expect("connector dropped");
    assert_eq!(device.next_written().await, "M115");
    device.reply("ok").await;
    device
}
