use quanta::Clock;
use tracing::debug;

use crate::common::BuildError;
use crate::config::{Directive, Settings, TimeUnit};
use crate::recorder::{Inner, StatsdRecorder};
use crate::transport::UdpTransport;

/// Builder for creating a [`StatsdRecorder`] for one configuration scope.
///
/// Every setter normalizes its input the same way the directive surface does, so building
/// from code and building from [`Directive`]s produce identical settings.
#[derive(Clone, Debug)]
pub struct StatsdBuilder {
    settings: Settings,
}

impl StatsdBuilder {
    /// Creates a new [`StatsdBuilder`].
    ///
    /// Recording starts out disabled, legacy mode on, reporting milliseconds to
    /// `localhost:8125`.
    pub fn new() -> Self {
        StatsdBuilder {
            settings: Settings::default(),
        }
    }

    /// Creates a builder from an ordered list of `(directive, value)` pairs.
    ///
    /// ## Errors
    ///
    /// The first directive that fails to parse or apply aborts the build and is returned.
    pub fn from_directives<I, N, V>(directives: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        directives
            .into_iter()
            .try_fold(StatsdBuilder::new(), |builder, (name, value)| {
                builder.apply(Directive::parse(name.as_ref(), value.as_ref())?)
            })
    }

    /// Applies a single parsed directive.
    ///
    /// ## Errors
    ///
    /// Only `StatsdExclude` can fail here, if one of its patterns does not compile.
    pub fn apply(self, directive: Directive) -> Result<Self, BuildError> {
        debug!(%directive, "applying statsd directive");
        let builder = match directive {
            Directive::Enable(enabled) => self.enable(enabled),
            Directive::LegacyMode(legacy) => self.set_legacy_mode(legacy),
            Directive::Host(host) => self.set_host(host),
            Directive::Port(port) => self.set_port(port),
            Directive::TimeUnit(unit) => self.set_time_unit(unit),
            Directive::Prefix(prefix) => self.set_prefix(prefix),
            Directive::Suffix(suffix) => self.set_suffix(suffix),
            Directive::Stat(stat) => self.set_stat(stat),
            Directive::AggregateStat(stat) => self.set_aggregate_stat(stat),
            Directive::Exclude(patterns) => patterns
                .iter()
                .try_fold(self, |builder, pattern| builder.add_exclusion(pattern))?,
            Directive::HttpVerbs(verbs) => verbs
                .into_iter()
                .fold(self, |builder, verb| builder.add_http_verb(verb)),
        };
        Ok(builder)
    }

    /// Turns recording on or off for this scope.
    #[must_use]
    pub fn enable(mut self, enabled: bool) -> Self {
        self.settings.enabled = enabled;
        self
    }

    /// Sets whether an explicit `:1|c` counter is sent next to every timer.
    ///
    /// Collectors that predate automatic counters for timers need this. Defaults to `true`.
    #[must_use]
    pub fn set_legacy_mode(mut self, legacy: bool) -> Self {
        self.settings.legacy_mode = legacy;
        self
    }

    /// Sets the statsd host. It is only resolved when the first request needs the socket.
    #[must_use]
    pub fn set_host<H>(mut self, host: H) -> Self
    where
        H: Into<String>,
    {
        self.settings.host = host.into();
        self
    }

    #[must_use]
    pub fn set_port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    #[must_use]
    pub fn set_time_unit(mut self, unit: TimeUnit) -> Self {
        self.settings.time_unit = unit;
        self
    }

    /// Sets a prefix for every stat name. A trailing `.` is added if missing.
    #[must_use]
    pub fn set_prefix<P>(mut self, prefix: P) -> Self
    where
        P: Into<String>,
    {
        self.settings.prefix = with_trailing_dot(prefix.into());
        self
    }

    /// Sets a suffix for every stat name, placed after the status code. A leading `.` is
    /// added if missing.
    #[must_use]
    pub fn set_suffix<S>(mut self, suffix: S) -> Self
    where
        S: Into<String>,
    {
        self.settings.suffix = with_leading_dot(suffix.into());
        self
    }

    /// Sets a fixed stat key, used instead of anything derived from the request.
    #[must_use]
    pub fn set_stat<S>(mut self, stat: S) -> Self
    where
        S: Into<String>,
    {
        self.settings.stat = with_trailing_dot(stat.into());
        self
    }

    /// Sets an aggregate stat key, emitted alongside the per-request one.
    #[must_use]
    pub fn set_aggregate_stat<S>(mut self, stat: S) -> Self
    where
        S: Into<String>,
    {
        self.settings.aggregate_stat = with_trailing_dot(stat.into());
        self
    }

    /// Adds a regular expression for path segments to leave out of derived stat keys.
    ///
    /// Patterns are tried in the order they were added and match case-insensitively.
    ///
    /// ## Errors
    ///
    /// If `pattern` is not a valid regular expression, an error variant will be returned.
    pub fn add_exclusion(mut self, pattern: &str) -> Result<Self, BuildError> {
        self.settings.exclusions.push(pattern)?;
        Ok(self)
    }

    /// Adds an HTTP verb to report separately.
    ///
    /// Once at least one verb is listed, every method that is not listed is reported as
    /// `OtherVerbs`.
    #[must_use]
    pub fn add_http_verb<V>(mut self, verb: V) -> Self
    where
        V: Into<String>,
    {
        self.settings.http_verbs.push(verb.into());
        self
    }

    /// Returns the settings built so far.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Builds the recorder. The socket is opened lazily by the first request.
    pub fn build(self) -> StatsdRecorder {
        self.build_with_clock(Clock::new())
    }

    pub fn build_with_clock(self, clock: Clock) -> StatsdRecorder {
        let transport = UdpTransport::new(self.settings.host.clone(), self.settings.port);
        let inner = Inner {
            settings: self.settings,
            transport,
            clock,
        };

        StatsdRecorder::from(inner)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder::new()
    }
}

fn with_trailing_dot(mut value: String) -> String {
    if !value.is_empty() && !value.ends_with('.') {
        value.push('.');
    }
    value
}

fn with_leading_dot(value: String) -> String {
    if value.is_empty() || value.starts_with('.') {
        value
    } else {
        format!(".{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::StatsdBuilder;
    use crate::common::BuildError;
    use crate::config::TimeUnit;

    #[test]
    fn test_defaults() {
        let builder = StatsdBuilder::new();
        let settings = builder.settings();
        assert!(!settings.enabled());
        assert!(settings.legacy_mode());
        assert_eq!(settings.time_unit(), TimeUnit::Milliseconds);
        assert_eq!(settings.host(), "localhost");
        assert_eq!(settings.port(), 8125);
        assert_eq!(settings.prefix(), "");
        assert_eq!(settings.suffix(), "");
        assert_eq!(settings.stat(), None);
        assert_eq!(settings.aggregate_stat(), None);
        assert!(settings.exclusions().is_empty());
        assert!(settings.http_verbs().is_empty());
    }

    #[test]
    fn test_separators_are_normalized() {
        let builder = StatsdBuilder::new()
            .set_prefix("app")
            .set_suffix("web1")
            .set_stat("fixed")
            .set_aggregate_stat("all.");
        let settings = builder.settings();
        assert_eq!(settings.prefix(), "app.");
        assert_eq!(settings.suffix(), ".web1");
        assert_eq!(settings.stat(), Some("fixed."));
        assert_eq!(settings.aggregate_stat(), Some("all."));

        let builder = StatsdBuilder::new().set_prefix("app.").set_suffix(".web1");
        assert_eq!(builder.settings().prefix(), "app.");
        assert_eq!(builder.settings().suffix(), ".web1");
    }

    #[test]
    fn test_from_directives() {
        let builder = StatsdBuilder::from_directives([
            ("Statsd", "On"),
            ("StatsdLegacyMode", "off"),
            ("StatsdHost", "stats.local"),
            ("StatsdPort", "9125"),
            ("StatsdTimeUnit", "microseconds"),
            ("StatsdPrefix", "app"),
            ("StatsdExclude", r"^\d+$"),
            ("StatsdExclude", "^tmp$ ^cache$"),
            ("StatsdHTTPVerbs", "GET POST"),
            ("StatsdHTTPVerbs", "PUT"),
        ])
        .expect("directives should apply");

        let settings = builder.settings();
        assert!(settings.enabled());
        assert!(!settings.legacy_mode());
        assert_eq!(settings.host(), "stats.local");
        assert_eq!(settings.port(), 9125);
        assert_eq!(settings.time_unit(), TimeUnit::Microseconds);
        assert_eq!(settings.prefix(), "app.");
        assert_eq!(settings.exclusions().len(), 3);
        assert_eq!(settings.http_verbs(), ["GET", "POST", "PUT"]);
    }

    #[test]
    fn test_bad_exclusion_fails_the_build() {
        let err = StatsdBuilder::from_directives([("StatsdExclude", "ok [unclosed")])
            .expect_err("pattern must not compile");
        assert!(matches!(
            err,
            BuildError::InvalidExcludePattern { ref pattern, .. } if pattern == "[unclosed"
        ));
    }

    #[test]
    fn test_unknown_directive_fails_the_build() {
        let err = StatsdBuilder::from_directives([("Statsd", "On"), ("StatsdColor", "blue")])
            .expect_err("directive must be rejected");
        assert!(matches!(err, BuildError::UnknownDirective(ref name) if name == "StatsdColor"));
    }
}
