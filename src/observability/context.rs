//! Request-scoped trace context and baggage.
//!
//! A [`PropagationContext`] is created once per inbound request and is never
//! mutated. It is made ambient with [`with_context`], which stores it in a
//! tokio task-local and instruments the future with the context's `tracing`
//! span. The task-local is swapped in on every poll and swapped out on every
//! suspension, so concurrently running requests never observe each other's
//! context.
//!
//! Wire formats follow W3C Trace Context (`traceparent`) and W3C Baggage
//! (`baggage`).

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const BAGGAGE_HEADER: &str = "baggage";

tokio::task_local! {
    static CURRENT: PropagationContext;
}

/// 16-byte trace identifier, never all zeroes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

impl TraceId {
    pub fn random() -> Self {
        loop {
            let v: u128 = rand::random();
            if v != 0 {
                return Self(v.to_be_bytes());
            }
        }
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let v = u128::from_str_radix(s, 16).ok()?;
        (v != 0).then(|| Self(v.to_be_bytes()))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self)
    }
}

/// 8-byte span identifier, never all zeroes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl SpanId {
    pub fn random() -> Self {
        loop {
            let v: u64 = rand::random();
            if v != 0 {
                return Self(v.to_be_bytes());
            }
        }
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let v = u64::from_str_radix(s, 16).ok()?;
        (v != 0).then(|| Self(v.to_be_bytes()))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", u64::from_be_bytes(self.0))
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

/// W3C trace flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags(pub u8);

impl TraceFlags {
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    pub fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// A single baggage value with optional W3C property metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaggageEntry {
    pub value: String,
    pub metadata: Option<String>,
}

impl BaggageEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            metadata: None,
        }
    }
}

/// Immutable key/value annotations carried alongside a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baggage {
    entries: BTreeMap<String, BaggageEntry>,
}

impl Baggage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&BaggageEntry> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BaggageEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a copy with `entries` layered on top; later keys win.
    pub fn with_entries<I, K>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, BaggageEntry)>,
        K: Into<String>,
    {
        let mut merged = self.entries.clone();
        for (k, v) in entries {
            merged.insert(k.into(), v);
        }
        Self { entries: merged }
    }

    /// Parse a W3C `baggage` header. Malformed members are skipped.
    pub fn from_header(header: &str) -> Self {
        let mut entries = BTreeMap::new();
        for member in header.split(',') {
            let mut parts = member.splitn(2, ';');
            let pair = parts.next().unwrap_or_default();
            let metadata = parts
                .next()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty());

            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let Some(value) = percent_decode(value.trim()) else {
                continue;
            };
            entries.insert(key.to_string(), BaggageEntry { value, metadata });
        }
        Self { entries }
    }

    /// Render as a W3C `baggage` header value.
    pub fn to_header(&self) -> String {
        self.entries
            .iter()
            .map(|(k, e)| match &e.metadata {
                Some(meta) => format!("{}={};{}", k, percent_encode(&e.value), meta),
                None => format!("{}={}", k, percent_encode(&e.value)),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'!' | b'#'..=b'$' | b'&'..=b'+' | b'-'..=b':' | b'<' | b'>'..=b'[' | b']'..=b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Parent trace identity received on an inbound `traceparent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub flags: TraceFlags,
}

impl TraceParent {
    pub fn parse(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() < 4 {
            return None;
        }
        let version = parts[0];
        if version.len() != 2 || version.eq_ignore_ascii_case("ff") {
            return None;
        }
        u8::from_str_radix(version, 16).ok()?;
        if version == "00" && parts.len() != 4 {
            return None;
        }
        let flags = parts[3];
        if flags.len() != 2 {
            return None;
        }
        Some(Self {
            trace_id: TraceId::from_hex(parts[1])?,
            span_id: SpanId::from_hex(parts[2])?,
            flags: TraceFlags(u8::from_str_radix(flags, 16).ok()?),
        })
    }

    pub fn to_header(&self) -> String {
        format!("00-{}-{}-{}", self.trace_id, self.span_id, self.flags)
    }
}

struct ContextInner {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    flags: TraceFlags,
    baggage: Baggage,
    span: tracing::Span,
}

/// Immutable trace identity plus baggage for one unit of work.
///
/// Cloning is cheap; clones share the same identity.
#[derive(Clone)]
pub struct PropagationContext {
    inner: Arc<ContextInner>,
}

impl PropagationContext {
    /// Start a new trace carrying `entries` as baggage.
    pub fn create<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, BaggageEntry)>,
        K: Into<String>,
    {
        Self::create_with_parent(None, &Baggage::new(), entries)
    }

    /// Start a span that continues `remote` when present, otherwise a new
    /// trace. `entries` are layered over `inherited` baggage.
    pub fn create_with_parent<I, K>(
        remote: Option<&TraceParent>,
        inherited: &Baggage,
        entries: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, BaggageEntry)>,
        K: Into<String>,
    {
        let (trace_id, parent_span_id, flags) = match remote {
            Some(p) => (p.trace_id, Some(p.span_id), p.flags),
            None => (TraceId::random(), None, TraceFlags::SAMPLED),
        };
        let span_id = SpanId::random();
        let span = tracing::info_span!(
            "request",
            trace_id = %trace_id,
            span_id = %span_id,
        );
        Self {
            inner: Arc::new(ContextInner {
                trace_id,
                span_id,
                parent_span_id,
                flags,
                baggage: inherited.with_entries(entries),
                span,
            }),
        }
    }

    /// Derive a context for a sub-operation. The parent is left untouched.
    pub fn child(&self, name: &'static str) -> Self {
        let span_id = SpanId::random();
        let span = tracing::info_span!(
            parent: &self.inner.span,
            "operation",
            otel.name = name,
            trace_id = %self.inner.trace_id,
            span_id = %span_id,
            parent_span_id = %self.inner.span_id,
        );
        Self {
            inner: Arc::new(ContextInner {
                trace_id: self.inner.trace_id,
                span_id,
                parent_span_id: Some(self.inner.span_id),
                flags: self.inner.flags,
                baggage: self.inner.baggage.clone(),
                span,
            }),
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.inner.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.inner.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.inner.parent_span_id
    }

    pub fn trace_flags(&self) -> TraceFlags {
        self.inner.flags
    }

    pub fn baggage(&self) -> &Baggage {
        &self.inner.baggage
    }

    pub fn span(&self) -> &tracing::Span {
        &self.inner.span
    }

    /// Headers to attach to an outbound call made under this context.
    pub fn outbound_headers(&self) -> Vec<(&'static str, String)> {
        let parent = TraceParent {
            trace_id: self.inner.trace_id,
            span_id: self.inner.span_id,
            flags: self.inner.flags,
        };
        let mut headers = vec![(TRACEPARENT_HEADER, parent.to_header())];
        if !self.inner.baggage.is_empty() {
            headers.push((BAGGAGE_HEADER, self.inner.baggage.to_header()));
        }
        headers
    }
}

impl fmt::Debug for PropagationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationContext")
            .field("trace_id", &self.inner.trace_id)
            .field("span_id", &self.inner.span_id)
            .field("parent_span_id", &self.inner.parent_span_id)
            .field("flags", &self.inner.flags)
            .field("baggage", &self.inner.baggage)
            .finish()
    }
}

/// Run `fut` with `ctx` as the ambient context for its whole asynchronous
/// extent.
pub async fn with_context<F>(ctx: PropagationContext, fut: F) -> F::Output
where
    F: Future,
{
    let span = ctx.span().clone();
    CURRENT.scope(ctx, fut.instrument(span)).await
}

/// Run `fut` under a child of the ambient context, or bare if there is none.
pub async fn in_child<F>(name: &'static str, fut: F) -> F::Output
where
    F: Future,
{
    match current() {
        Some(parent) => with_context(parent.child(name), fut).await,
        None => fut.await,
    }
}

/// The ambient context of the running task, if any.
pub fn current() -> Option<PropagationContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}
