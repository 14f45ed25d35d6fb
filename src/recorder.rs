use std::sync::Arc;

use quanta::Clock;
use tracing::{debug, trace, warn};

use crate::common::TransportError;
use crate::config::Settings;
use crate::formatting::{classify_verb, MetricLines};
use crate::key::{resolve_stat_key, StatKey};
use crate::request::{
    terminal_of, terminal_of_mut, RequestContext, HEADER_STAT, NOTE_NAME, NOTE_NAME_AGGREGATE,
    NOTE_NAME_STAT,
};
use crate::transport::{Delivery, MetricSink, TelemetrySnapshot, UdpTransport};

pub(crate) struct Inner {
    pub settings: Settings,
    pub transport: UdpTransport,
    pub clock: Clock,
}

/// What was sent for one request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Emission {
    pub stat: String,
    pub aggregate_stat: Option<String>,
    /// Duration in the configured time unit.
    pub duration: u64,
    pub delivery: Delivery,
    pub legacy_mode: bool,
}

impl Emission {
    /// Renders the `statsd` note: `"<stat> <duration> <bytes-sent> <legacy 0|1>"`.
    pub fn note(&self) -> String {
        format!(
            "{} {} {} {}",
            self.stat,
            self.duration,
            self.delivery.bytes_sent(),
            u8::from(self.legacy_mode)
        )
    }
}

/// Result of running the recorder over one request.
#[derive(Debug)]
pub enum Outcome {
    /// Recording is disabled for this scope.
    Disabled,
    /// Sub-requests are accounted for through their top-level request.
    SubRequest,
    /// The socket could not be opened. Emission is skipped and retried on a later request.
    TransportUnavailable(TransportError),
    /// Nothing to name the stat by.
    EmptyStat,
    /// A payload was handed to the transport.
    Emitted(Emission),
}

impl Outcome {
    pub fn emission(&self) -> Option<&Emission> {
        match self {
            Outcome::Emitted(emission) => Some(emission),
            _ => None,
        }
    }
}

/// Emits statsd timers and counters for completed requests of one configuration scope.
///
/// Cloning is cheap and every clone shares the same settings and socket, so one recorder can
/// be handed to every worker of the scope.
#[derive(Clone)]
pub struct StatsdRecorder {
    inner: Arc<Inner>,
}

impl From<Inner> for StatsdRecorder {
    fn from(inner: Inner) -> Self {
        StatsdRecorder {
            inner: Arc::new(inner),
        }
    }
}

impl StatsdRecorder {
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Opens the socket now instead of on the first request.
    ///
    /// Hosts with a single-threaded setup phase can call this there. Failure is not fatal:
    /// requests will keep trying to connect lazily.
    pub fn connect(&self) -> Result<(), TransportError> {
        self.inner.transport.ensure_connected().map(|_| ())
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.inner.transport.telemetry().snapshot()
    }

    /// Stat key that would be used for `request`, after walking to its terminal record.
    pub fn stat_key(&self, request: &RequestContext) -> StatKey {
        let settings = &self.inner.settings;
        let terminal = terminal_of(request);
        resolve_stat_key(
            &terminal.path,
            terminal.note(NOTE_NAME_STAT),
            terminal.header(HEADER_STAT),
            settings.stat(),
            settings.exclusions(),
        )
    }

    /// Records a completed top-level request.
    ///
    /// This never fails the request: every problem ends in an [`Outcome`] describing why
    /// nothing, or only part of the payload, was sent. On emission the `statsd` note, and the
    /// `statsd.aggregate` note when an aggregate key is configured, are set on the terminal
    /// record of the chain.
    pub fn record(&self, request: &mut RequestContext) -> Outcome {
        let settings = &self.inner.settings;
        if !settings.enabled() {
            return Outcome::Disabled;
        }
        if request.is_subrequest {
            return Outcome::SubRequest;
        }

        let socket = match self.inner.transport.ensure_connected() {
            Ok(socket) => socket,
            Err(e) => {
                warn!(
                    endpoint = %self.inner.transport.endpoint(),
                    "could not get statsd socket: {}", e
                );
                return Outcome::TransportUnavailable(e);
            }
        };

        self.record_to(request, &*socket)
    }

    /// Builds and sends the payload for `request` on `sink`, then records the notes.
    fn record_to<S>(&self, request: &mut RequestContext, sink: &S) -> Outcome
    where
        S: MetricSink + ?Sized,
    {
        let settings = &self.inner.settings;
        let started = request.started;
        let terminal = terminal_of(request);
        let key = self.stat_key(request);
        let verb = classify_verb(&terminal.method, settings.http_verbs());

        let finished = terminal.finished.unwrap_or_else(|| self.inner.clock.now());
        let elapsed = finished.saturating_duration_since(started);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let duration = micros / settings.time_unit().divider();
        trace!(duration, unit = settings.time_unit().as_str(), "request duration");

        let lines = MetricLines {
            prefix: settings.prefix(),
            key: &key,
            verb,
            status: terminal.status,
            suffix: settings.suffix(),
            duration,
            legacy: settings.legacy_mode(),
            aggregate_key: settings.aggregate_stat(),
        };
        let payload = match lines.render() {
            Some(payload) => payload,
            None => return Outcome::EmptyStat,
        };
        debug!(stat = %payload.stat, "sending stat");

        let delivery = self.inner.transport.send(sink, &payload.body);
        let emission = Emission {
            stat: payload.stat,
            aggregate_stat: payload.aggregate_stat,
            duration,
            delivery,
            legacy_mode: settings.legacy_mode(),
        };

        let terminal = terminal_of_mut(request);
        if let Some(aggregate) = &emission.aggregate_stat {
            terminal
                .notes
                .insert(NOTE_NAME_AGGREGATE.to_owned(), aggregate.clone());
        }
        terminal.notes.insert(NOTE_NAME.to_owned(), emission.note());

        Outcome::Emitted(emission)
    }
}
