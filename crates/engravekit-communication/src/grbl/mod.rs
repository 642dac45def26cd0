//! GRBL / FluidNC protocol support.

pub mod codes;
pub mod commands;
pub mod response;
pub mod status;

pub use codes::{alarm_message, error_message, format_alarm, format_error};
pub use response::GrblResponse;
pub use status::{Axes, BufferState, MachineState, Overrides, StatusReport};
