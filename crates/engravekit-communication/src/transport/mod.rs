//! Device transports
//!
//! A [`Connector`] opens a [`Link`] to the controller. Incoming bytes are
//! split into lines by a background reader that feeds an mpsc channel, so
//! receiving is cancel-safe and can sit inside `select!` next to timeouts and
//! the emergency-stop signal. The channel closing means the link is gone.
//!
//! The writer is shared: the exchange path and the emergency stop both
//! write through it, and the stop never waits for a response.

pub mod serial;
pub mod simulated;
pub mod tcp;

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use engravekit_settings::{ConnectionSettings, ConnectionType};

pub use serial::{list_ports, SerialConnector, SerialPortInfo};
pub use simulated::{SimulatedConnector, SimulatedDevice};
pub use tcp::TcpConnector;

/// Lines buffered between the reader and the channel
pub const LINE_BUFFER: usize = 256;

/// Write side of a link
#[async_trait]
pub trait LinkWriter: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Writer shared by exchanges and the emergency stop
pub type SharedWriter = Arc<Mutex<Box<dyn LinkWriter>>>;

/// An open connection to the controller
pub struct Link {
    /// Incoming lines without terminators
    pub lines: mpsc::Receiver<String>,
    pub writer: SharedWriter,
}

impl Link {
    pub fn new(lines: mpsc::Receiver<String>, writer: impl LinkWriter + 'static) -> Self {
        Self {
            lines,
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links to one endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> io::Result<Link>;

    /// Human-readable endpoint, e.g. `tcp://fluidnc.local:23`
    fn endpoint(&self) -> String;
}

/// Build the connector selected by the connection settings
pub fn connector_for(settings: &ConnectionSettings) -> Arc<dyn Connector> {
    match settings.connection_type {
        ConnectionType::Serial => Arc::new(SerialConnector::new(
            settings.serial_port.clone(),
            settings.baud_rate,
        )),
        ConnectionType::Tcp => Arc::new(TcpConnector::new(
            settings.host.clone(),
            settings.tcp_port,
            settings.command_timeout(),
        )),
        ConnectionType::Simulated => Arc::new(SimulatedConnector::new(SimulatedDevice::new())),
    }
}

/// Split a byte stream into trimmed, non-empty lines
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.partial).trim().to_string();
                self.partial.clear();
                if !line.is_empty() {
                    lines.push(line);
                }
            } else {
                self.partial.push(b);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_splitter_handles_partial_reads() {
        let mut splitter = LineSplitter::default();
        assert!(splitter.push(b"o").is_empty());
        assert_eq!(splitter.push(b"k\r\n<Idle|MPos:0,0,0>\n\n"), vec!["ok", "<Idle|MPos:0,0,0>"]);
        assert_eq!(splitter.push(b"error:2"), Vec::<String>::new());
        assert_eq!(splitter.push(b"0\n"), vec!["error:20"]);
    }

    #[test]
    fn test_connector_for_selects_transport() {
        let mut settings = ConnectionSettings::default();
        settings.connection_type = ConnectionType::Tcp;
        settings.host = "10.0.0.5".to_string();
        settings.tcp_port = 23;
        assert_eq!(connector_for(&settings).endpoint(), "tcp://10.0.0.5:23");

        settings.connection_type = ConnectionType::Serial;
        assert_eq!(connector_for(&settings).endpoint(), "serial:///dev/ttyUSB0@115200");

        settings.connection_type = ConnectionType::Simulated;
        assert_eq!(connector_for(&settings).endpoint(), "simulated://grbl");
    }
}
