//! Telnet-style TCP transport (FluidNC network mode).

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{Connector, Link, LinkWriter, LineSplitter, LINE_BUFFER};

/// Connects to `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }
}

struct TcpWriter {
    half: OwnedWriteHalf,
}

#[async_trait]
impl LinkWriter for TcpWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.half.write_all(bytes).await?;
        self.half.flush().await
    }
}

async fn read_lines(mut half: OwnedReadHalf, tx: mpsc::Sender<String>, endpoint: String) {
    let mut splitter = LineSplitter::default();
    let mut buf = [0u8; 1024];
    loop {
        let n = tokio::select! {
            _ = tx.closed() => break,
            read = half.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::info!(endpoint = %endpoint, "controller closed the connection");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, "read failed: {}", e);
                    break;
                }
            },
        };
        for line in splitter.push(&buf[..n]) {
            tracing::trace!(endpoint = %endpoint, "<< {}", line);
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<Link> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connect to {} timed out", addr)))??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(read_lines(read_half, tx, self.endpoint()));

        Ok(Link::new(rx, TcpWriter { half: write_half }))
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_lines_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let command = lines.next_line().await.unwrap().unwrap();
            write.write_all(b"[echo]\r\nok\r\n").await.unwrap();
            command
        });

        let connector = TcpConnector::new("127.0.0.1", port, Duration::from_secs(2));
        let mut link = connector.connect().await.unwrap();
        link.writer.lock().await.write_all(b"G0 X1\n").await.unwrap();

        assert_eq!(link.lines.recv().await.unwrap(), "[echo]");
        assert_eq!(link.lines.recv().await.unwrap(), "ok");
        assert_eq!(server.await.unwrap(), "G0 X1");
        // peer closed: the line channel ends
        assert_eq!(link.lines.recv().await, None);
    }
}
