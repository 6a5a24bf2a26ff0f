// src/hardware/serial.rs - Line oriented serial transport to the printer firmware
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 4096;
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open {port} at {baud} baud: {source}")]
    Open {
        port: String,
        baud: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("Transport is closed")]
    Closed,
    #[error("Serial IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle notifications and received lines, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Line(String),
    Closed,
}

/// Write half used by the engine. Writes are best effort and never block.
pub trait LineSink: Send {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError>;
}

impl LineSink for mpsc::UnboundedSender<String> {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.send(line.to_string()).map_err(|_| TransportError::Closed)
    }
}

/// Background tasks serving one connection. Dropping the set aborts them,
/// so a released connection never keeps reading from the port.
#[derive(Debug, Default)]
pub struct TransportTasks {
    handles: Vec<JoinHandle<()>>,
}

impl TransportTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for TransportTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// An open connection: the write half, the stream of transport events and
/// the tasks that pump them.
pub struct TransportHandle {
    pub port: String,
    pub writer: mpsc::UnboundedSender<String>,
    pub events: mpsc::Receiver<TransportEvent>,
    pub tasks: TransportTasks,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("port", &self.port)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, port: &str, baud: u32) -> Result<TransportHandle, TransportError>;
    fn available_ports(&self) -> Vec<String>;
}

/// Opens real serial ports through serial2-tokio.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector;

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, port: &str, baud: u32) -> Result<TransportHandle, TransportError> {
        tracing::info!("Opening serial port {} at {} baud", port, baud);
        let serial = SerialPort::open(port, baud).map_err(|source| TransportError::Open {
            port: port.to_string(),
            baud,
            source,
        })?;
        let serial = Arc::new(serial);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<String>();

        // Opened must be queued before the reader can emit anything
        let _ = event_tx.send(TransportEvent::Opened).await;
        let mut tasks = TransportTasks::new();
        tasks.push(tokio::spawn(read_loop(serial.clone(), event_tx.clone())));
        tasks.push(tokio::spawn(write_loop(serial, writer_rx, event_tx)));

        Ok(TransportHandle {
            port: port.to_string(),
            writer: writer_tx,
            events: event_rx,
            tasks,
        })
    }

    fn available_ports(&self) -> Vec<String> {
        match SerialPort::available_ports() {
            Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate serial ports: {}", e);
                vec![]
            }
        }
    }
}

/// Splits a byte stream into lines. Carriage returns are dropped and empty
/// lines are skipped. Incomplete trailing data stays buffered.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.pending);
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches('\r');
                if !line.trim().is_empty() {
                    lines.push(line.to_string());
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }
}

async fn read_loop(port: Arc<SerialPort>, events: mpsc::Sender<TransportEvent>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut splitter = LineSplitter::new();
    loop {
        match port.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("Serial connection closed by remote");
                break;
            }
            Ok(n) => {
                tracing::trace!("Read {} bytes from serial", n);
                for line in splitter.push(&buf[..n]) {
                    if events.send(TransportEvent::Line(line)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                tracing::error!("Serial read error: {}", e);
                break;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}

async fn write_loop(
    port: Arc<SerialPort>,
    mut commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<TransportEvent>,
) {
    while let Some(command) = commands.recv().await {
        let framed = format!("{}\n", command);
        if let Err(e) = write_all(&port, framed.as_bytes()).await {
            tracing::error!("Serial write error: {}", e);
            let _ = events.send(TransportEvent::Closed).await;
            break;
        }
    }
    tracing::info!("Serial writer task terminated");
}

async fn write_all(port: &SerialPort, mut bytes: &[u8]) -> std::io::Result<()> {
    while !bytes.is_empty() {
        let n = port.write(bytes).await?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "serial port accepted no bytes"));
        }
        bytes = &bytes[n..];
    }
    Ok(())
}
