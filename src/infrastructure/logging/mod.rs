//! Logging infrastructure.
//!
//! Structured logging built on `tracing`/`tracing-subscriber`:
//! - [`config`] — log level, format (JSON/pretty), rotation policy
//! - [`logger`] — subscriber assembly, optional file rotation via `tracing-appender`
//! - [`secret_scrubbing`] — a `tracing_subscriber::Layer` that redacts API keys
//!   and bearer tokens from log messages before they reach any sink
//! - [`rotation`] — retention-based cleanup of rotated log files
//! - [`audit`] — a separate JSON audit trail for security-relevant events
//!   (research plan lifecycle, sub-agent spawns/failures, provider credential
//!   access, denied tool calls)

pub mod audit;
pub mod config;
pub mod logger;
pub mod rotation;
pub mod secret_scrubbing;

pub use audit::{AuditEvent, AuditEventType, AuditLogger, AuditOutcome};
pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use rotation::LogRotator;
pub use secret_scrubbing::SecretScrubbingLayer;
