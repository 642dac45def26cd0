//! In-process GRBL simulator
//!
//! Used for dry runs and tests. [`SimulatedDevice`] is a cloneable handle
//! to the simulated controller; tests keep one clone to script faults
//! (silence, alarms, rejected lines, dropped links) and to inspect what was
//! sent, while the channel talks to it through [`SimulatedConnector`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{Connector, Link, LinkWriter, LINE_BUFFER};
use crate::grbl::commands::{FEED_HOLD, SOFT_RESET, STATUS_QUERY};

const BANNER: &str = "Grbl 1.1h ['$' for help]";

#[derive(Debug)]
struct SimState {
    /// Firmware state as reported in status lines
    machine_state: &'static str,
    position: (f64, f64, f64),
    /// Sender of the open link, if any
    tx: Option<mpsc::Sender<String>>,
    generation: u64,
    /// Soft resets seen; replies queued before a reset are discarded
    resets: u64,
    connects: u32,
    refuse_connections: bool,
    muted: bool,
    /// Answer realtime bytes but never acknowledge lines
    lines_ignored: bool,
    start_locked: bool,
    response_delay: Duration,
    reject: Vec<(String, u8)>,
    alarm_on: Vec<(String, u8)>,
    received: Vec<String>,
    realtime: Vec<u8>,
}

/// Handle to a simulated controller
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                machine_state: "Idle",
                position: (0.0, 0.0, 0.0),
                tx: None,
                generation: 0,
                resets: 0,
                connects: 0,
                refuse_connections: false,
                muted: false,
                lines_ignored: false,
                start_locked: false,
                response_delay: Duration::ZERO,
                reject: Vec::new(),
                alarm_on: Vec::new(),
                received: Vec::new(),
                realtime: Vec::new(),
            })),
        }
    }

    /// Stop answering anything, including status queries
    pub fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    /// Keep answering status queries while dropping every line unanswered
    pub fn set_ignore_lines(&self, ignore: bool) {
        self.state.lock().lines_ignored = ignore;
    }

    /// Refuse new connections
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Delay every response, emulating motion time
    pub fn set_response_delay(&self, delay: Duration) {
        self.state.lock().response_delay = delay;
    }

    /// Boot into the alarm lock, as GRBL does with homing enabled
    pub fn set_start_locked(&self, locked: bool) {
        self.state.lock().start_locked = locked;
    }

    /// Answer lines containing `pattern` with `error:code`
    pub fn reject_lines_containing(&self, pattern: &str, code: u8) {
        self.state.lock().reject.push((pattern.to_string(), code));
    }

    /// Raise `ALARM:code` on lines containing `pattern`
    pub fn alarm_on_line_containing(&self, pattern: &str, code: u8) {
        self.state.lock().alarm_on.push((pattern.to_string(), code));
    }

    /// Close the current link from the device side
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.tx = None;
        state.generation += 1;
    }

    /// Push an unsolicited line to the open link
    pub fn inject(&self, line: &str) {
        let state = self.state.lock();
        if let Some(tx) = &state.tx {
            let _ = tx.try_send(line.to_string());
        }
    }

    /// Command lines received, in order
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Realtime bytes received, in order
    pub fn realtime(&self) -> Vec<u8> {
        self.state.lock().realtime.clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    pub fn machine_state(&self) -> &'static str {
        self.state.lock().machine_state
    }

    pub fn position(&self) -> (f64, f64, f64) {
        self.state.lock().position
    }

    fn open(&self) -> io::Result<(mpsc::Receiver<String>, u64)> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "simulated controller refused the connection",
            ));
        }
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        state.generation += 1;
        state.connects += 1;
        if state.start_locked {
            state.machine_state = "Alarm";
        }
        let _ = tx.try_send(BANNER.to_string());
        if state.start_locked {
            let _ = tx.try_send("[MSG:'$H'|'$X' to unlock]".to_string());
        }
        state.tx = Some(tx);
        Ok((rx, state.generation))
    }

    /// Replies for one realtime byte
    fn realtime_byte(state: &mut SimState, byte: u8) -> Vec<String> {
        state.realtime.push(byte);
        match byte {
            STATUS_QUERY => {
                let (x, y, z) = state.position;
                vec![format!(
                    "<{}|MPos:{:.3},{:.3},{:.3}|FS:0,0>",
                    state.machine_state, x, y, z
                )]
            }
            FEED_HOLD => {
                state.machine_state = "Hold:0";
                Vec::new()
            }
            SOFT_RESET => {
                state.resets += 1;
                state.machine_state = "Alarm";
                vec![
                    BANNER.to_string(),
                    "[MSG:'$H'|'$X' to unlock]".to_string(),
                ]
            }
            _ => Vec::new(),
        }
    }

    /// Replies for one command line
    fn command_line(state: &mut SimState, line: &str) -> Vec<String> {
        state.received.push(line.to_string());

        if let Some((_, code)) = state.alarm_on.iter().find(|(p, _)| line.contains(p.as_str())) {
            let code = *code;
            state.machine_state = "Alarm";
            return vec![format!("ALARM:{}", code)];
        }
        if let Some((_, code)) = state.reject.iter().find(|(p, _)| line.contains(p.as_str())) {
            return vec![format!("error:{}", code)];
        }

        let upper = line.to_ascii_uppercase();
        match upper.as_str() {
            "$X" => {
                state.machine_state = "Idle";
                return vec!["[MSG:Caution: Unlocked]".to_string(), "ok".to_string()];
            }
            "$H" => {
                state.machine_state = "Idle";
                state.position = (0.0, 0.0, 0.0);
                return vec!["ok".to_string()];
            }
            _ => {}
        }

        if state.machine_state == "Alarm" && !upper.starts_with('$') {
            return vec!["error:9".to_string()];
        }
        if state.machine_state.starts_with("Hold") {
            state.machine_state = "Idle";
        }

        if upper.starts_with("G0") || upper.starts_with("G1") {
            for word in upper.split_whitespace().skip(1) {
                let mut chars = word.chars();
                let Some(axis) = chars.next() else {
                    continue;
                };
                let Ok(value) = chars.as_str().parse::<f64>() else {
                    continue;
                };
                match axis {
                    'X' => state.position.0 = value,
                    'Y' => state.position.1 = value,
                    'Z' => state.position.2 = value,
                    _ => {}
                }
            }
        }
        vec!["ok".to_string()]
    }
}

/// Connector for a [`SimulatedDevice`]
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    device: SimulatedDevice,
}

impl SimulatedConnector {
    pub fn new(device: SimulatedDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }
}

struct SimulatedWriter {
    device: SimulatedDevice,
    generation: u64,
    partial: Vec<u8>,
}

#[async_trait]
impl LinkWriter for SimulatedWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let (tx, replies, delay, resets) = {
            let mut state = self.device.state.lock();
            let tx = match &state.tx {
                Some(tx) if state.generation == self.generation => tx.clone(),
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "simulated link closed",
                    ))
                }
            };

            let mut replies = Vec::new();
            for &b in bytes {
                match b {
                    STATUS_QUERY | FEED_HOLD | SOFT_RESET => {
                        replies.extend(SimulatedDevice::realtime_byte(&mut state, b));
                    }
                    b'\n' => {
                        let line = String::from_utf8_lossy(&self.partial).trim().to_string();
                        self.partial.clear();
                        if !line.is_empty() && !state.lines_ignored {
                            replies.extend(SimulatedDevice::command_line(&mut state, &line));
                        }
                    }
                    _ => self.partial.push(b),
                }
            }
            if state.muted {
                replies.clear();
            }
            (tx, replies, state.response_delay, state.resets)
        };

        if replies.is_empty() {
            return Ok(());
        }
        if delay.is_zero() {
            for reply in replies {
                let _ = tx.try_send(reply);
            }
        } else {
            let device = self.device.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if device.state.lock().resets != resets {
                    return;
                }
                for reply in replies {
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self) -> io::Result<Link> {
        let (rx, generation) = self.device.open()?;
        Ok(Link::new(
            rx,
            SimulatedWriter {
                device: self.device.clone(),
                generation,
                partial: Vec::new(),
            },
        ))
    }

    fn endpoint(&self) -> String {
        "simulated://grbl".to_string()
    }
}
