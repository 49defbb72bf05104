//! Observability setup for Weave: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{
    LogFormat, TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing,
};
