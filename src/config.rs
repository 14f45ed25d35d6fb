use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::common::BuildError;
use crate::key::Exclusions;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8125;

/// Unit that request durations are reported in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TimeUnit {
    Seconds,
    #[default]
    Milliseconds,
    Microseconds,
}

impl TimeUnit {
    /// Parses a unit name, ignoring case. Anything unrecognized falls back to milliseconds.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!(value, "unknown statsd time unit, using milliseconds");
            TimeUnit::Milliseconds
        })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Microseconds => "microseconds",
        }
    }

    /// Number of microseconds per reported tick.
    pub const fn divider(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1_000_000,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Microseconds => 1,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("seconds") {
            Ok(TimeUnit::Seconds)
        } else if s.eq_ignore_ascii_case("milliseconds") {
            Ok(TimeUnit::Milliseconds)
        } else if s.eq_ignore_ascii_case("microseconds") {
            Ok(TimeUnit::Microseconds)
        } else {
            Err(format!("unknown time unit {:?}", s))
        }
    }
}

/// Validated, immutable configuration of one scope.
///
/// Built through [`StatsdBuilder`](crate::StatsdBuilder), which enforces the separator
/// invariants: `prefix`, `stat` and `aggregate_stat` are empty or end with `.`, and `suffix`
/// is empty or starts with `.`.
#[derive(Clone, Debug)]
pub struct Settings {
    pub(crate) enabled: bool,
    pub(crate) legacy_mode: bool,
    pub(crate) time_unit: TimeUnit,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) prefix: String,
    pub(crate) suffix: String,
    pub(crate) stat: String,
    pub(crate) aggregate_stat: String,
    pub(crate) exclusions: Exclusions,
    pub(crate) http_verbs: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: false,
            // statsd itself defaults to legacy namespacing
            legacy_mode: true,
            time_unit: TimeUnit::Milliseconds,
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            prefix: String::new(),
            suffix: String::new(),
            stat: String::new(),
            aggregate_stat: String::new(),
            exclusions: Exclusions::new(),
            http_verbs: Vec::new(),
        }
    }
}

impl Settings {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn legacy_mode(&self) -> bool {
        self.legacy_mode
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The fixed stat key, if one is configured.
    pub fn stat(&self) -> Option<&str> {
        Some(self.stat.as_str()).filter(|s| !s.is_empty())
    }

    /// The aggregate stat key, if one is configured.
    pub fn aggregate_stat(&self) -> Option<&str> {
        Some(self.aggregate_stat.as_str()).filter(|s| !s.is_empty())
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn http_verbs(&self) -> &[String] {
        &self.http_verbs
    }
}

/// One configuration directive, as a host server would hand it over.
///
/// Names are matched case-insensitively once, when parsing; applying a directive to a
/// [`StatsdBuilder`](crate::StatsdBuilder) is then a plain match on the variant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Directive {
    /// `Statsd On|Off`
    Enable(bool),
    /// `StatsdLegacyMode On|Off`
    LegacyMode(bool),
    /// `StatsdHost <host>`
    Host(String),
    /// `StatsdPort <port>`
    Port(u16),
    /// `StatsdTimeUnit seconds|milliseconds|microseconds`
    TimeUnit(TimeUnit),
    /// `StatsdPrefix <prefix>`
    Prefix(String),
    /// `StatsdSuffix <suffix>`
    Suffix(String),
    /// `StatsdStat <key>`
    Stat(String),
    /// `StatsdAggregateStat <key>`
    AggregateStat(String),
    /// `StatsdExclude <regex>...`
    Exclude(Vec<String>),
    /// `StatsdHTTPVerbs <verb>...`
    HttpVerbs(Vec<String>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DirectiveKind {
    Enable,
    LegacyMode,
    Host,
    Port,
    TimeUnit,
    Prefix,
    Suffix,
    Stat,
    AggregateStat,
    Exclude,
    HttpVerbs,
}

impl DirectiveKind {
    const ALL: [DirectiveKind; 11] = [
        DirectiveKind::Enable,
        DirectiveKind::LegacyMode,
        DirectiveKind::Host,
        DirectiveKind::Port,
        DirectiveKind::TimeUnit,
        DirectiveKind::Prefix,
        DirectiveKind::Suffix,
        DirectiveKind::Stat,
        DirectiveKind::AggregateStat,
        DirectiveKind::Exclude,
        DirectiveKind::HttpVerbs,
    ];

    const fn name(self) -> &'static str {
        match self {
            DirectiveKind::Enable => "Statsd",
            DirectiveKind::LegacyMode => "StatsdLegacyMode",
            DirectiveKind::Host => "StatsdHost",
            DirectiveKind::Port => "StatsdPort",
            DirectiveKind::TimeUnit => "StatsdTimeUnit",
            DirectiveKind::Prefix => "StatsdPrefix",
            DirectiveKind::Suffix => "StatsdSuffix",
            DirectiveKind::Stat => "StatsdStat",
            DirectiveKind::AggregateStat => "StatsdAggregateStat",
            DirectiveKind::Exclude => "StatsdExclude",
            DirectiveKind::HttpVerbs => "StatsdHTTPVerbs",
        }
    }
}

impl Directive {
    /// Parses a directive from its name and raw argument string.
    ///
    /// ## Errors
    ///
    /// Unknown names, empty values, flags other than `on`/`off`, and ports that are not a
    /// valid `u16` are rejected. Exclusion patterns are compiled later, when applied.
    pub fn parse(name: &str, value: &str) -> Result<Directive, BuildError> {
        let kind = DirectiveKind::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| BuildError::UnknownDirective(name.to_owned()))?;
        let canonical = kind.name();

        let value = value.trim();
        if value.is_empty() {
            return Err(BuildError::EmptyValue(canonical));
        }

        let directive = match kind {
            DirectiveKind::Enable => Directive::Enable(parse_flag(canonical, value)?),
            DirectiveKind::LegacyMode => Directive::LegacyMode(parse_flag(canonical, value)?),
            DirectiveKind::Host => Directive::Host(value.to_owned()),
            DirectiveKind::Port => Directive::Port(
                value
                    .parse()
                    .map_err(|_| BuildError::InvalidPort(value.to_owned()))?,
            ),
            DirectiveKind::TimeUnit => Directive::TimeUnit(TimeUnit::parse_lenient(value)),
            DirectiveKind::Prefix => Directive::Prefix(value.to_owned()),
            DirectiveKind::Suffix => Directive::Suffix(value.to_owned()),
            DirectiveKind::Stat => Directive::Stat(value.to_owned()),
            DirectiveKind::AggregateStat => Directive::AggregateStat(value.to_owned()),
            DirectiveKind::Exclude => Directive::Exclude(split_args(value)),
            DirectiveKind::HttpVerbs => Directive::HttpVerbs(split_args(value)),
        };
        Ok(directive)
    }

    /// The canonical spelling of this directive's name.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Enable(_) => DirectiveKind::Enable,
            Directive::LegacyMode(_) => DirectiveKind::LegacyMode,
            Directive::Host(_) => DirectiveKind::Host,
            Directive::Port(_) => DirectiveKind::Port,
            Directive::TimeUnit(_) => DirectiveKind::TimeUnit,
            Directive::Prefix(_) => DirectiveKind::Prefix,
            Directive::Suffix(_) => DirectiveKind::Suffix,
            Directive::Stat(_) => DirectiveKind::Stat,
            Directive::AggregateStat(_) => DirectiveKind::AggregateStat,
            Directive::Exclude(_) => DirectiveKind::Exclude,
            Directive::HttpVerbs(_) => DirectiveKind::HttpVerbs,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| if b { "On" } else { "Off" };
        match self {
            Directive::Enable(b) | Directive::LegacyMode(b) => {
                write!(f, "{} {}", self.name(), flag(*b))
            }
            Directive::Host(v)
            | Directive::Prefix(v)
            | Directive::Suffix(v)
            | Directive::Stat(v)
            | Directive::AggregateStat(v) => write!(f, "{} {}", self.name(), v),
            Directive::Port(p) => write!(f, "{} {}", self.name(), p),
            Directive::TimeUnit(u) => write!(f, "{} {}", self.name(), u.as_str()),
            Directive::Exclude(list) | Directive::HttpVerbs(list) => {
                write!(f, "{} {}", self.name(), list.join(" "))
            }
        }
    }
}

fn parse_flag(directive: &'static str, value: &str) -> Result<bool, BuildError> {
    if value.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(BuildError::InvalidFlag {
            directive,
            value: value.to_owned(),
        })
    }
}

fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_owned).collect()
}
