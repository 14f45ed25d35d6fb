//! Per-request statsd timers and counters for HTTP servers.
//!
//! ## Basics
//!
//! `request-statsd` derives a hierarchical stat name from a completed HTTP request and sends
//! a timer for it, plus optionally a counter, to a statsd collector over UDP.
//!
//! ## High-level features
//!
//! - stat keys derived from the request path, with configurable exclusion of path segments
//! - stat keys overridden per request through a `statsd.stat` note or an `X-Statsd-Stat`
//!   response header, or fixed per scope
//! - HTTP verb whitelisting, folding every other verb into `OtherVerbs`
//! - legacy mode, which sends an explicit counter next to every timer
//! - an aggregate stat emitted alongside the per-request one
//!
//! ## Behavior
//!
//! This crate makes some explicit trade-offs to accomplish its task:
//!
//! - Every request is sent as its own datagram, right when it completes; nothing is
//!   aggregated locally
//! - Sending is fire-and-forget: failed and partial writes are logged and counted, never
//!   retried, and never surfaced to the request
//! - The socket is opened by the first request that needs it and shared by every clone of
//!   the recorder afterwards; if it cannot be opened the request is skipped and the next one
//!   tries again
//!
//! A stat name looks like `<prefix><key><verb>.<status><suffix>`. For instance, with a prefix
//! of `app` and an exclusion of `\d+`, a `GET /api/Users/123` answered with a `200` after 42ms
//! is sent as `app.api.Users.GET.200:42|ms`.
//!
//! ## Usage
//!
//! ```no_run
//! use request_statsd::{RequestContext, StatsdBuilder};
//!
//! // Build one recorder per configuration scope, either in code or from the directives a
//! // server configuration file would contain.
//! let recorder = StatsdBuilder::from_directives([
//!     ("Statsd", "On"),
//!     ("StatsdPrefix", "app"),
//!     ("StatsdExclude", r"^\d+$"),
//! ])
//! .expect("invalid statsd configuration");
//! let recorder = recorder.build();
//!
//! // Then, once the response of a top-level request is final:
//! let clock = quanta::Clock::new();
//! let mut request = RequestContext::new("GET", "/api/Users/123", clock.now()).with_status(200);
//! let outcome = recorder.record(&mut request);
//! ```
mod common;
pub use self::common::{BuildError, TransportError};

mod builder;
pub use self::builder::StatsdBuilder;

mod config;
pub use self::config::{Directive, Settings, TimeUnit, DEFAULT_HOST, DEFAULT_PORT};

pub mod formatting;
pub mod key;
pub mod request;
pub mod transport;

mod recorder;
pub use self::recorder::{Emission, Outcome, StatsdRecorder};

pub use self::key::{Exclusions, KeySource, StatKey};
pub use self::request::{terminal_of, RequestContext};
