//! # EngraveKit
//!
//! A laser name-engraving station. Names arrive from live-stream events or
//! the operator, wait in a durable queue, get a spot on the board, are
//! compiled to G-code and streamed to a GRBL/FluidNC controller over one
//! exclusive link.
//!
//! ## Architecture
//!
//! EngraveKit is organized as a workspace with multiple crates:
//!
//! 1. **engravekit-core** - Error taxonomy, request model, geometry, events
//! 2. **engravekit-settings** - Configuration, engraving area, data paths
//! 3. **engravekit-placement** - Surface occupancy and placement records
//! 4. **engravekit-textpath** - Stroke font layout and motion programs
//! 5. **engravekit-communication** - Controller link, GRBL protocol, session
//! 6. **engravekit-pipeline** - Job queue, orchestrator, intake, service
//! 7. **engravekit** - HTTP API and the binary that wires it all together

pub mod api;
pub mod app;

pub use app::App;

pub use engravekit_core::{
    AppEvent, EngraveRequest, Error, ErrorKind, EventBus, JobId, JobSource, JobStatus, Result,
    SessionState,
};

pub use engravekit_pipeline::{EngraverService, JobQueue, Orchestrator};

pub use engravekit_settings::{Config, DataPaths, EngravingArea};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Environment variable selecting JSON log lines
pub const LOG_JSON_ENV: &str = "ENGRAVEKIT_LOG_JSON";

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output, human readable unless `ENGRAVEKIT_LOG_JSON` is set
/// - RUST_LOG environment variable support, `info` by default
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var_os(LOG_JSON_ENV).is_some_and(|v| !v.is_empty() && v != "0");

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
