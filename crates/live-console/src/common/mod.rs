pub mod telemetry;

pub use telemetry::{LOG_FILE_ENV, TelemetryGuard, init_tracing};
