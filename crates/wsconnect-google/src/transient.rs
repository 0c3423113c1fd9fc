//! Classification of transport failures that are safe to retry.
//!
//! Only failures where the request demonstrably never produced a response are
//! transient: dropped or refused connections, truncated streams, and
//! transport timeouts. A well-formed API error response is never transient
//! here, whatever its status; those go through [`crate::classify`].

use std::error::Error;
use std::io;

use crate::transport::TransportError;

/// Message fragments that identify a retryable fault after the typed error
/// has been flattened into a string somewhere down the chain.
const TRANSIENT_MESSAGE_MARKERS: &[&str] = &[
    "connection reset",
    "connection refused",
    "broken pipe",
    "unexpected eof",
    "unexpected end of file",
    "use of closed network connection",
    "connection closed",
];

/// Returns true if `err` is a transport-level fault that can be retried.
///
/// Walks the whole source chain so that an `io::Error` wrapped by hyper and
/// reqwest is still recognised.
pub fn is_transient(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);

    while let Some(err) = current {
        if let Some(transport) = err.downcast_ref::<TransportError>()
            && transport.is_temporary()
        {
            return true;
        }

        if let Some(io_err) = err.downcast_ref::<io::Error>()
            && is_transient_io_kind(io_err.kind())
        {
            return true;
        }

        if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>()
            && reqwest_err.is_timeout()
        {
            return true;
        }

        if message_is_transient(&err.to_string()) {
            return true;
        }

        current = err.source();
    }

    false
}

fn is_transient_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
    )
}

fn message_is_transient(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    if TRANSIENT_MESSAGE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        return true;
    }
    // bare "EOF" only as a whole word, so "geofence" does not match
    message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "eof")
}
