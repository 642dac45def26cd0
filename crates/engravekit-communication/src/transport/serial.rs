//! Serial/USB transport
//!
//! The `serialport` crate is blocking, so the port is read on a dedicated
//! thread and written from the blocking pool.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{Connector, Link, LinkWriter, LineSplitter, LINE_BUFFER};

/// Read timeout; bounds how long the reader thread takes to notice a
/// dropped link
const READ_POLL: Duration = Duration::from_millis(50);

/// Many controller boards reset when the port opens
const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    pub description: String,
    pub manufacturer: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// List serial ports that look like controller boards
pub fn list_ports() -> io::Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(io::Error::other)?;
    Ok(ports
        .into_iter()
        .filter(|p| is_controller_port(&p.port_name))
        .map(|p| match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                description: format!(
                    "USB {} {}",
                    usb.manufacturer.as_deref().unwrap_or("Device"),
                    usb.product.as_deref().unwrap_or("Serial Port")
                ),
                manufacturer: usb.manufacturer,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                port_name: p.port_name,
            },
            _ => SerialPortInfo {
                port_name: p.port_name,
                description: "Serial Port".to_string(),
                manufacturer: None,
                vid: None,
                pid: None,
            },
        })
        .collect())
}

/// COM ports on Windows, USB/ACM ttys on Linux, usbserial/usbmodem on macOS
fn is_controller_port(name: &str) -> bool {
    if let Some(n) = name.strip_prefix("COM") {
        return !n.is_empty() && n.chars().all(|c| c.is_ascii_digit());
    }
    name.starts_with("/dev/ttyUSB")
        || name.starts_with("/dev/ttyACM")
        || name.starts_with("/dev/cu.usbserial")
        || name.starts_with("/dev/cu.usbmodem")
}

/// Opens a serial port at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    settle: Duration,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            settle: DEFAULT_SETTLE,
        }
    }

    /// Delay after opening before the link is handed out
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

struct SerialWriter {
    port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
}

#[async_trait]
impl LinkWriter for SerialWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut port = port.lock();
            port.write_all(&bytes)?;
            port.flush()
        })
        .await
        .map_err(io::Error::other)?
    }
}

fn read_lines(mut port: Box<dyn serialport::SerialPort>, tx: mpsc::Sender<String>, name: String) {
    let mut splitter = LineSplitter::default();
    let mut buf = [0u8; 256];
    while !tx.is_closed() {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    tracing::trace!(port = %name, "<< {}", line);
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                tracing::warn!(port = %name, "serial read failed: {}", e);
                return;
            }
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> io::Result<Link> {
        let name = self.port.clone();
        let baud = self.baud_rate;
        let (reader, writer) = tokio::task::spawn_blocking(move || {
            let port = serialport::new(&name, baud)
                .timeout(READ_POLL)
                .open()
                .map_err(|e| io::Error::other(format!("failed to open {}: {}", name, e)))?;
            let reader = port.try_clone().map_err(io::Error::other)?;
            Ok::<_, io::Error>((reader, port))
        })
        .await
        .map_err(io::Error::other)??;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let name = self.port.clone();
        std::thread::Builder::new()
            .name(format!("serial-reader {}", name))
            .spawn(move || read_lines(reader, tx, name))?;

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        Ok(Link::new(
            rx,
            SerialWriter {
                port: Arc::new(Mutex::new(writer)),
            },
        ))
    }

    fn endpoint(&self) -> String {
        format!("serial://{}@{}", self.port, self.baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_port_patterns() {
        assert!(is_controller_port("COM3"));
        assert!(is_controller_port("/dev/ttyUSB0"));
        assert!(is_controller_port("/dev/ttyACM1"));
        assert!(is_controller_port("/dev/cu.usbmodem1421"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("/dev/ttyS0"));
    }

    #[tokio::test]
    async fn test_missing_port_fails_to_open() {
        let connector = SerialConnector::new("/dev/engravekit-missing", 115200)
            .with_settle(Duration::ZERO);
        assert!(connector.connect().await.is_err());
        assert_eq!(connector.endpoint(), "serial:///dev/engravekit-missing@115200");
    }
}
