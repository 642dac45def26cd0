//! # EngraveKit Communication
//!
//! The exclusive link to the engraver's controller. Supports Serial/USB,
//! TCP (FluidNC telnet) and an in-process GRBL simulator for dry runs.
//! GRBL response parsing, the hardware session state machine and the
//! recoverable [`HardwareChannel`] live here.

pub mod channel;
pub mod grbl;
pub mod session;
pub mod transport;

pub use channel::{HardwareChannel, JobClaim};

pub use grbl::{GrblResponse, MachineState, StatusReport};

pub use session::{HardwareSession, SessionEvent};

pub use transport::{
    connector_for, list_ports, Connector, Link, LinkWriter, SerialConnector, SerialPortInfo,
    SimulatedConnector, SimulatedDevice, TcpConnector,
};
