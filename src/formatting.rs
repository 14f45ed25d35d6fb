// <METRIC_NAME>:<VALUE>|<TYPE>
// Multiple metrics share one datagram, newline delimited:
// <METRIC_NAME>:<VALUE>|<TYPE>\n<METRIC_NAME>:<VALUE>|<TYPE>
use crate::key::StatKey;

/// Character used in place of anything statsd or graphite cannot take inside a segment.
pub const REPLACE_CHAR: char = '_';

/// Verb used for every method that is not in the configured whitelist.
pub const GENERIC_VERB: &str = "OtherVerbs";

/// Sanitizes one path segment so it can be used inside a stat name.
///
/// `.` would introduce a new graphite level, and `:` and `|` are part of the statsd line
/// protocol. Each is replaced by [`REPLACE_CHAR`], so the length is preserved.
pub fn sanitize_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if invalid_segment_character(c) {
            out.push(REPLACE_CHAR);
        } else {
            out.push(c);
        }
    }
    out
}

/// Sanitizes a stat key supplied as a whole, such as a per-request override.
///
/// `.` is kept as the level separator. `:` and `|` are replaced like in path segments, and so
/// are `\r` and `\n`, which would otherwise start a new line in the datagram.
pub fn sanitize_stat_key(key: &str) -> String {
    key.chars()
        .map(|c| if invalid_key_character(c) { REPLACE_CHAR } else { c })
        .collect()
}

/// Maps an HTTP method to the verb used in the stat name.
///
/// With an empty whitelist the method is kept as-is. Otherwise it is kept only if it matches a
/// whitelisted verb case-insensitively, and [`GENERIC_VERB`] is used instead.
pub fn classify_verb<'a, S>(method: &'a str, whitelist: &[S]) -> &'a str
where
    S: AsRef<str>,
{
    if whitelist.is_empty() || whitelist.iter().any(|v| v.as_ref().eq_ignore_ascii_case(method)) {
        method
    } else {
        GENERIC_VERB
    }
}

/// Builds a full stat name, `<prefix><key><verb>.<status><suffix>`.
///
/// `prefix` and `key` are expected to be empty or end with `.`, and `suffix` to be empty or
/// start with `.`. Returns `None` when there is nothing to name the stat by.
pub fn stat_name(prefix: &str, key: &str, verb: &str, status: u16, suffix: &str) -> Option<String> {
    if prefix.is_empty() && key.is_empty() && verb.is_empty() {
        return None;
    }

    let mut name = String::with_capacity(prefix.len() + key.len() + verb.len() + 4 + suffix.len());
    name.push_str(prefix);
    // no dot between key and verb, the key always ends in one
    name.push_str(key);
    name.push_str(verb);
    name.push('.');
    name.push_str(status.to_string().as_str());
    name.push_str(suffix);
    Some(name)
}

/// Appends one `<name>:<value>|<type>` line to `buffer`, newline-separated from any previous
/// line.
pub fn write_metric_line<T>(buffer: &mut String, name: &str, value: T, mtype: &str)
where
    T: std::fmt::Display,
{
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(name);
    buffer.push(':');
    buffer.push_str(value.to_string().as_str());
    buffer.push('|');
    buffer.push_str(mtype);
}

/// Everything needed to render the metric lines of one request.
#[derive(Clone, Debug)]
pub struct MetricLines<'a> {
    pub prefix: &'a str,
    pub key: &'a StatKey,
    pub verb: &'a str,
    pub status: u16,
    pub suffix: &'a str,
    /// Duration, already converted to the configured time unit.
    pub duration: u64,
    pub legacy: bool,
    pub aggregate_key: Option<&'a str>,
}

/// A rendered datagram and the stat names it carries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payload {
    pub stat: String,
    pub aggregate_stat: Option<String>,
    pub body: String,
}

impl<'a> MetricLines<'a> {
    /// Renders the payload: the timer, then the counter in legacy mode, then the same pair
    /// for the aggregate key if one is configured.
    ///
    /// Returns `None` if the primary stat name would be empty.
    pub fn render(&self) -> Option<Payload> {
        let stat = stat_name(self.prefix, self.key.as_str(), self.verb, self.status, self.suffix)?;

        let mut body = String::new();
        self.write_stat(&mut body, &stat);

        let aggregate_stat = self
            .aggregate_key
            .filter(|key| !key.is_empty())
            .and_then(|key| stat_name(self.prefix, key, self.verb, self.status, self.suffix));
        if let Some(aggregate) = &aggregate_stat {
            self.write_stat(&mut body, aggregate);
        }

        Some(Payload {
            stat,
            aggregate_stat,
            body,
        })
    }

    fn write_stat(&self, buffer: &mut String, name: &str) {
        write_metric_line(buffer, name, self.duration, "ms");
        // legacy collectors don't derive a counter from the timer
        if self.legacy {
            write_metric_line(buffer, name, 1, "c");
        }
    }
}

#[inline]
fn invalid_segment_character(c: char) -> bool {
    c == '.' || invalid_key_character(c)
}

#[inline]
fn invalid_key_character(c: char) -> bool {
    c == ':' || c == '|' || c == '\r' || c == '\n'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Exclusions, StatKey};
    use proptest::prelude::*;

    fn lines<'a>(key: &'a StatKey) -> MetricLines<'a> {
        MetricLines {
            prefix: "",
            key,
            verb: "GET",
            status: 200,
            suffix: "",
            duration: 42,
            legacy: false,
            aggregate_key: None,
        }
    }

    #[test]
    fn test_sanitize_path_segment() {
        let test_cases = vec![
            ("plain", "plain"),
            ("index.html", "index_html"),
            ("a:b|c", "a_b_c"),
            ("...", "___"),
            ("", ""),
        ];

        for (input, expected) in test_cases {
            assert_eq!(sanitize_path_segment(input), expected);
        }
    }

    #[test]
    fn test_sanitize_stat_key() {
        let test_cases = vec![
            ("api.users.", "api.users."),
            ("a:1|c", "a_1_c"),
            ("one\r\ntwo", "one__two"),
            ("", ""),
        ];

        for (input, expected) in test_cases {
            assert_eq!(sanitize_stat_key(input), expected);
        }
    }

    #[test]
    fn test_classify_verb() {
        let empty: [&str; 0] = [];
        assert_eq!(classify_verb("PATCH", &empty), "PATCH");
        assert_eq!(classify_verb("get", &empty), "get");

        let whitelist = ["GET", "post"];
        assert_eq!(classify_verb("GET", &whitelist), "GET");
        assert_eq!(classify_verb("Post", &whitelist), "Post");
        assert_eq!(classify_verb("DELETE", &whitelist), GENERIC_VERB);
    }

    #[test]
    fn test_stat_name() {
        assert_eq!(
            stat_name("app.", "api.users.", "GET", 200, "").as_deref(),
            Some("app.api.users.GET.200")
        );
        assert_eq!(
            stat_name("", "ROOT.", "HEAD", 404, ".web1").as_deref(),
            Some("ROOT.HEAD.404.web1")
        );
        assert_eq!(stat_name("", "", "", 200, ".x"), None);
    }

    #[test]
    fn test_round_trip_with_exclusion() {
        let mut exclusions = Exclusions::new();
        exclusions.push(r"\d+").unwrap();
        let key = StatKey::from_path("/api/Users/123", &exclusions);

        let payload = MetricLines {
            prefix: "app.",
            ..lines(&key)
        }
        .render()
        .unwrap();

        assert_eq!(payload.body, "app.api.Users.GET.200:42|ms");
        assert_eq!(payload.stat, "app.api.Users.GET.200");
        assert_eq!(payload.aggregate_stat, None);
    }

    #[test]
    fn test_all_excluded_keeps_verb_after_prefix() {
        let mut exclusions = Exclusions::new();
        exclusions.push(".").unwrap();
        let key = StatKey::from_path("/a/b", &exclusions);

        let payload = MetricLines {
            prefix: "app.",
            ..lines(&key)
        }
        .render()
        .unwrap();
        assert_eq!(payload.body, "app.GET.200:42|ms");
    }

    #[test]
    fn test_legacy_and_aggregate_ordering() {
        let key = StatKey::from_path("/foo", &Exclusions::new());
        let payload = MetricLines {
            prefix: "p.",
            suffix: ".s",
            legacy: true,
            aggregate_key: Some("all."),
            ..lines(&key)
        }
        .render()
        .unwrap();

        let expected = concat!(
            "p.foo.GET.200.s:42|ms\n",
            "p.foo.GET.200.s:1|c\n",
            "p.all.GET.200.s:42|ms\n",
            "p.all.GET.200.s:1|c",
        );
        assert_eq!(payload.body, expected);
        assert_eq!(payload.aggregate_stat.as_deref(), Some("p.all.GET.200.s"));
    }

    #[test]
    fn test_empty_aggregate_key_is_ignored() {
        let key = StatKey::from_path("/foo", &Exclusions::new());
        let payload = MetricLines {
            aggregate_key: Some(""),
            ..lines(&key)
        }
        .render()
        .unwrap();
        assert_eq!(payload.body, "foo.GET.200:42|ms");
        assert_eq!(payload.aggregate_stat, None);
    }

    proptest! {
        #[test]
        fn test_sanitized_segment_is_clean(input in ".*") {
            let result = sanitize_path_segment(&input);
            prop_assert_eq!(result.len(), input.len());
            prop_assert!(!result.contains(|c| c == '.' || c == ':' || c == '|'));
        }

        #[test]
        fn test_generic_verb_iff_not_whitelisted(
            method in "[a-zA-Z]{1,8}",
            whitelist in proptest::collection::vec("[a-zA-Z]{1,8}", 1..5),
        ) {
            let listed = whitelist.iter().any(|v| v.eq_ignore_ascii_case(&method));
            let verb = classify_verb(&method, &whitelist);
            if listed {
                prop_assert_eq!(verb, method.as_str());
            } else {
                prop_assert_eq!(verb, GENERIC_VERB);
            }
        }

        #[test]
        fn test_legacy_adds_one_counter_per_stat(
            path in "[a-z/]{0,20}",
            aggregate in proptest::option::of("[a-z]{1,5}\\."),
        ) {
            let key = StatKey::from_path(&path, &Exclusions::new());
            let base = MetricLines { aggregate_key: aggregate.as_deref(), ..lines(&key) };
            let plain = base.render().unwrap();
            let legacy = MetricLines { legacy: true, ..base.clone() }.render().unwrap();

            let stats = 1 + usize::from(plain.aggregate_stat.is_some());
            prop_assert_eq!(plain.body.lines().count(), stats);
            prop_assert_eq!(legacy.body.lines().count(), stats * 2);
            prop_assert_eq!(legacy.body.lines().filter(|l| l.ends_with(":1|c")).count(), stats);
            prop_assert_eq!(plain.body.lines().filter(|l| l.ends_with(":1|c")).count(), 0);
        }
    }
}
