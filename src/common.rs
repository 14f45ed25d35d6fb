use std::io;

use thiserror::Error as ThisError;

/// Errors that could occur while building a [`StatsdRecorder`](crate::StatsdRecorder).
///
/// All of these surface at configuration time. Nothing on the per-request path returns a
/// `BuildError`.
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// The directive name is not one this crate understands.
    #[error("no such directive {0}")]
    UnknownDirective(String),

    /// A directive that takes a value was given an empty one.
    #[error("{0} not allowed to be empty")]
    EmptyValue(&'static str),

    /// A flag directive was given something other than `on` or `off`.
    #[error("{directive} must be On or Off, got {value:?}")]
    InvalidFlag {
        directive: &'static str,
        value: String,
    },

    /// The statsd port is not a valid UDP port number.
    #[error("invalid statsd port {0:?}")]
    InvalidPort(String),

    /// An exclusion pattern failed to compile.
    #[error("invalid exclusion pattern {pattern:?}: {source}")]
    InvalidExcludePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors raised while establishing the UDP socket towards the statsd collector.
///
/// The recorder never propagates these to the request; they only cause emission to be skipped
/// for the current request.
#[derive(Debug, ThisError)]
pub enum TransportError {
    /// Resolving `host:port` failed.
    #[error("failed to resolve statsd endpoint {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but produced no address.
    #[error("statsd endpoint {0} resolved to no addresses")]
    NoAddress(String),

    /// Binding or connecting the local socket failed.
    #[error("failed to open socket towards statsd: {0}")]
    Socket(#[from] io::Error),
}
