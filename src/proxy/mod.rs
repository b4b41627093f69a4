//! Request-lifecycle core of the proxy
//!
//! This module owns the per-request context object and the types at its
//! boundary with the routing tree. Routing evaluation itself, connection
//! I/O and configuration loading are external collaborators; they consume
//! these types but are not implemented here.
//!
//! ## Submodules
//!
//! - `context`: request context lifecycle and ownership transitions
//! - `logger`: completed-request log records and sinks

pub mod context;
pub mod logger;

pub use context::{
    ClientCallback, RequestContext, RequestPriority, ShardSplitCallback, TypedRequestContext,
};
pub use logger::{MetricsLogSink, RequestLogRecord, RequestLogSink, TracingLogSink};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A downstream cache destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opaque handle to the root of a routing tree.
///
/// Route evaluation lives outside this crate; requests only need a stable
/// handle they can pass to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub name: String,
}

impl ProxyRoute {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Immutable proxy configuration snapshot.
///
/// Supplied externally and shared via `Arc`. A dispatched request context
/// holds one of these for its whole lifetime, so in-flight requests keep
/// routing against the config they started with even while the proxy
/// reloads configuration concurrently.
#[derive(Debug)]
pub struct ProxyConfig {
    route: ProxyRoute,
    generation: u64,
}

impl ProxyConfig {
    pub fn new(route: ProxyRoute, generation: u64) -> Self {
        Self { route, generation }
    }

    /// Root of the routing tree for this config snapshot.
    pub fn proxy_route(&self) -> &ProxyRoute {
        &self.route
    }

    /// Reload generation this snapshot belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Shard-split decision observed during a recording (dry-run) traversal.
///
/// Shard-splitting policy is external; recording contexts only receive
/// the decision through their shard callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSplit {
    /// Routing prefix the split applies to
    pub prefix: String,
    /// Number of shards the key space splits into
    pub shards: u32,
}

/// Per-proxy request accounting shared by every context.
///
/// In-flight tracking pairs an increment at context creation with a
/// decrement in the context's `Drop`, which runs once the last shared
/// reference goes away.
#[derive(Debug, Default)]
pub struct ProxyStats {
    requests_started: AtomicU64,
    requests_finished: AtomicU64,
    replies_sent: AtomicU64,
    requests_in_flight: AtomicU64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_finished(&self) {
        self.requests_finished.fetch_add(1, Ordering::Relaxed);
        self.requests_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn reply_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_started(&self) -> u64 {
        self.requests_started.load(Ordering::Relaxed)
    }

    pub fn requests_finished(&self) -> u64 {
        self.requests_finished.load(Ordering::Relaxed)
    }

    pub fn replies_sent(&self) -> u64 {
        self.replies_sent.load(Ordering::Relaxed)
    }

    pub fn requests_in_flight(&self) -> u64 {
        self.requests_in_flight.load(Ordering::Relaxed)
    }
}

/// Routing metadata attached to a reply so the completed-request log
/// record can attribute it.
#[derive(Debug, Clone)]
pub struct ReplyMeta {
    pub pool_name: String,
    pub endpoint: Endpoint,
    pub stripped_routing_prefix: String,
}

/// A decoded cache request the proxy can route.
///
/// Payload encoding and decoding are the codec's concern; the lifecycle
/// core only needs a name and key for log attribution, and the reply type
/// for typed delivery.
pub trait CacheRequest: Send + 'static {
    type Reply: CacheReply + Send;

    /// Operation name for log records (for example `"get"`).
    fn name(&self) -> &'static str;

    /// Key bytes this request addresses.
    fn key(&self) -> &[u8];
}

/// A reply to a cache request.
pub trait CacheReply {
    /// Result label for log records and metrics (for example `"found"`).
    fn result_label(&self) -> &'static str;
}
