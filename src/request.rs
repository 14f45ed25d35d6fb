use indexmap::IndexMap;
use quanta::Instant;

/// Note recording what was sent for a request: `"<stat> <duration> <bytes-sent> <legacy>"`.
pub const NOTE_NAME: &str = "statsd";
/// Note that, when set on a request, overrides the stat key.
pub const NOTE_NAME_STAT: &str = "statsd.stat";
/// Note recording the aggregate stat name, when one is configured.
pub const NOTE_NAME_AGGREGATE: &str = "statsd.aggregate";
/// Response header that, when set, overrides the stat key unless a note already does.
pub const HEADER_STAT: &str = "X-Statsd-Stat";

/// A completed HTTP request, as seen by the recorder.
///
/// Internal redirects and similar continuations are represented by [`next`](Self::next): the
/// last record of the chain holds the final status and any notes set late in processing.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub path: String,
    pub method: String,
    pub status: u16,
    pub started: Instant,
    /// When the response was complete. If unset the recorder's clock is read at hook time.
    pub finished: Option<Instant>,
    /// `true` for sub-requests, which never emit on their own.
    pub is_subrequest: bool,
    pub notes: IndexMap<String, String>,
    pub headers_out: IndexMap<String, String>,
    pub next: Option<Box<RequestContext>>,
}

impl RequestContext {
    pub fn new<P, M>(method: M, path: P, started: Instant) -> Self
    where
        P: Into<String>,
        M: Into<String>,
    {
        RequestContext {
            path: path.into(),
            method: method.into(),
            status: 200,
            started,
            finished: None,
            is_subrequest: false,
            notes: IndexMap::new(),
            headers_out: IndexMap::new(),
            next: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn finished_at(mut self, finished: Instant) -> Self {
        self.finished = Some(finished);
        self
    }

    #[must_use]
    pub fn with_note<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.notes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers_out.insert(key.into(), value.into());
        self
    }

    /// Appends `next` as the continuation of the last record in this chain.
    #[must_use]
    pub fn followed_by(mut self, next: RequestContext) -> Self {
        terminal_of_mut(&mut self).next = Some(Box::new(next));
        self
    }

    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    /// Looks up a response header, ignoring ASCII case in the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers_out
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Returns the last record of the continuation chain starting at `request`.
pub fn terminal_of(request: &RequestContext) -> &RequestContext {
    let mut current = request;
    while let Some(next) = current.next.as_deref() {
        current = next;
    }
    current
}

/// Mutable counterpart of [`terminal_of`].
pub fn terminal_of_mut(request: &mut RequestContext) -> &mut RequestContext {
    match request.next {
        Some(ref mut next) => terminal_of_mut(next),
        None => request,
    }
}
