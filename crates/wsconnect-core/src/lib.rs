//! Core types: normalized events, resource types, timestamps, tracing

pub mod event;
pub mod time;
pub mod tracing;

pub use event::{ActorRef, EventKind, NormalizedEvent, ResourceRef, ResourceType};
pub use time::{UNIX_ZERO, parse_activity_time};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
