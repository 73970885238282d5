// Public API - codec configuration, status types and the packet core
pub mod config;
pub mod error;
pub mod probe;

pub use config::{CodecConfig, FlowField, FlowSlot};
pub use error::{ConfigError, ParseError, ProbeError};
pub use probe::{
    Cursor, EchoLayout, ErrorReport, Mismatch, ProbeArgs, ProbeHeaders, ProbeId, ReportKind, Span,
    enter_error_report, probe_create, probe_finalize, probe_match,
};
