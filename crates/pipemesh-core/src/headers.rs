//! Trace/correlation headers carried unchanged across every pipeline hop.

/// The fixed allow-list. Anything else on an inbound request is dropped.
pub const TRACE_HEADERS: [&str; 7] = [
    "X-Ot-Span-Context",
    "X-Request-Id",
    "X-B3-TraceId",
    "X-B3-SpanId",
    "X-B3-ParentSpanId",
    "X-B3-Sampled",
    "X-B3-Flags",
];

/// The subset of [`TRACE_HEADERS`] present on one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceHeaders {
    values: Vec<(&'static str, String)>,
}

impl TraceHeaders {
    /// Collect allow-listed headers through a case-insensitive lookup.
    ///
    /// Empty values are skipped so they are never re-emitted downstream.
    pub fn collect<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let values = TRACE_HEADERS
            .iter()
            .filter_map(|name| {
                lookup(name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (*name, v))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(n, v)| (*n, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
