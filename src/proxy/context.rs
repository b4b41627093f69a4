//! Request context lifecycle
//!
//! A [`TypedRequestContext`] is alive for the duration of one logical
//! client request, including every sub-request fanned out while the
//! routing tree is evaluated.
//!
//! It starts life as a sole-owned value outside the routing layer. The
//! one allowed ownership transition is
//! [`dispatch`](TypedRequestContext::dispatch): it consumes the owned
//! value, pins the configuration snapshot the request will route
//! against, and returns a shared handle that every sub-request clones.
//! The context is destroyed when the last handle drops, and destruction
//! is the finalization point for stats accounting.
//!
//! Recording (dry-run) contexts are a disjoint variant: they observe
//! routing decisions through callbacks and never touch config, loggers
//! or real replies. Wrong-variant access returns a typed
//! [`ContextError`] instead of tripping a debug-only assertion.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

use super::logger::{RequestLogRecord, RequestLogSink};
use super::{CacheReply, CacheRequest, Endpoint, ProxyConfig, ProxyRoute, ProxyStats, ReplyMeta, ShardSplit};
use crate::error::ContextError;

/// Source of monotonically assigned request identifiers.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Processing priority of a request. Defaults to [`Critical`].
///
/// [`Critical`]: RequestPriority::Critical
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPriority {
    #[default]
    Critical,
    High,
    Normal,
    Low,
}

/// Invoked during a recording traversal when a request would be sent to
/// a destination: `(pool_name, index_in_pool, endpoint)`.
pub type ClientCallback = Box<dyn Fn(&str, usize, &Endpoint) + Send + Sync>;

/// Invoked during a recording traversal when a shard split is applied.
pub type ShardSplitCallback = Box<dyn Fn(&ShardSplit) + Send + Sync>;

/// Mode-specific context state, fixed at construction.
enum ContextMode {
    /// Real request: routed, replied to and logged.
    Normal {
        logger: Box<dyn RequestLogSink>,
        extra_logger: Box<dyn RequestLogSink>,
        /// Opaque slot the route evaluation may stash state in
        route_state: Mutex<Option<Box<dyn Any + Send>>>,
    },
    /// Dry-run request: observes routing decisions, performs no I/O,
    /// config access or logging.
    Recording {
        client_cb: Option<ClientCallback>,
        shard_cb: Option<ShardSplitCallback>,
        done: Option<Arc<Notify>>,
    },
}

/// Mode-independent core of a request context.
///
/// Routing code sees requests through this type; the typed wrapper adds
/// the decoded request and reply delivery.
pub struct RequestContext {
    id: u64,
    priority: RequestPriority,
    sender_id: u64,
    failover_disabled: bool,
    user_ip: String,
    mode: ContextMode,
    /// Pinned at dispatch; `None` while the context is still sole-owned
    config: Option<Arc<ProxyConfig>>,
    /// One-shot reply guard, first caller wins
    replied: AtomicBool,
    stats: Arc<ProxyStats>,
    started_at: Instant,
}

impl RequestContext {
    fn new(stats: Arc<ProxyStats>, priority: RequestPriority, mode: ContextMode) -> Self {
        stats.request_started();
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            priority,
            sender_id: 0,
            failover_disabled: false,
            user_ip: String::new(),
            mode,
            config: None,
            replied: AtomicBool::new(false),
            stats,
            started_at: Instant::now(),
        }
    }

    /// Create a recording (dry-run) context.
    ///
    /// A request routed with this context is not sent or logged anywhere.
    /// `client_cb` fires where a destination would normally receive the
    /// request; `shard_cb` fires where a shard split would apply.
    pub fn new_recording(
        stats: Arc<ProxyStats>,
        client_cb: Option<ClientCallback>,
        shard_cb: Option<ShardSplitCallback>,
    ) -> Arc<Self> {
        Arc::new(Self::new(
            stats,
            RequestPriority::default(),
            ContextMode::Recording {
                client_cb,
                shard_cb,
                done: None,
            },
        ))
    }

    /// Same as [`new_recording`](Self::new_recording), but additionally
    /// notifies `done` when the context is destroyed, i.e. when every
    /// sub-request referencing it has finished executing.
    pub fn new_recording_notify(
        stats: Arc<ProxyStats>,
        done: Arc<Notify>,
        client_cb: Option<ClientCallback>,
        shard_cb: Option<ShardSplitCallback>,
    ) -> Arc<Self> {
        Arc::new(Self::new(
            stats,
            RequestPriority::default(),
            ContextMode::Recording {
                client_cb,
                shard_cb,
                done: Some(done),
            },
        ))
    }

    /// Identifier of this request, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn priority(&self) -> RequestPriority {
        self.priority
    }

    /// Identity of the client session that issued this request.
    pub fn sender_id(&self) -> u64 {
        self.sender_id
    }

    pub fn set_sender_id(&mut self, id: u64) {
        self.sender_id = id;
    }

    pub fn failover_disabled(&self) -> bool {
        self.failover_disabled
    }

    pub fn set_failover_disabled(&mut self, disabled: bool) {
        self.failover_disabled = disabled;
    }

    pub fn user_ip(&self) -> &str {
        &self.user_ip
    }

    pub fn set_user_ip(&mut self, addr: impl Into<String>) {
        self.user_ip = addr.into();
    }

    /// Whether this is a recording (dry-run) context.
    pub fn recording(&self) -> bool {
        matches!(self.mode, ContextMode::Recording { .. })
    }

    /// Whether the one-shot reply has already been sent.
    pub fn replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Config snapshot this request routes against.
    ///
    /// Fails on a recording context and on a context that has not been
    /// dispatched yet; both are caller contract violations.
    pub fn proxy_config(&self) -> Result<&Arc<ProxyConfig>, ContextError> {
        if self.recording() {
            return Err(ContextError::RecordingAccess);
        }
        self.config.as_ref().ok_or(ContextError::NotDispatched)
    }

    /// Root of the routing tree for this request.
    pub fn proxy_route(&self) -> Result<&ProxyRoute, ContextError> {
        Ok(self.proxy_config()?.proxy_route())
    }

    /// Report a destination this request would be sent to.
    ///
    /// No-op unless this is a recording context with a client callback.
    pub fn record_destination(&self, pool_name: &str, index: usize, endpoint: &Endpoint) {
        if let ContextMode::Recording {
            client_cb: Some(cb),
            ..
        } = &self.mode
        {
            cb(pool_name, index, endpoint);
        }
    }

    /// Report a shard split applied while routing this request.
    ///
    /// No-op unless this is a recording context with a shard callback.
    pub fn record_shard_split(&self, split: &ShardSplit) {
        if let ContextMode::Recording {
            shard_cb: Some(cb), ..
        } = &self.mode
        {
            cb(split);
        }
    }

    /// Stash opaque state for the current route evaluation.
    ///
    /// Fails on a recording context, which carries no evaluation state.
    pub fn set_route_state(&self, state: Box<dyn Any + Send>) -> Result<(), ContextError> {
        match &self.mode {
            ContextMode::Normal { route_state, .. } => {
                *route_state.lock() = Some(state);
                Ok(())
            }
            ContextMode::Recording { .. } => Err(ContextError::RecordingAccess),
        }
    }

    /// Take back the state stashed by [`set_route_state`](Self::set_route_state).
    pub fn take_route_state(&self) -> Result<Option<Box<dyn Any + Send>>, ContextError> {
        match &self.mode {
            ContextMode::Normal { route_state, .. } => Ok(route_state.lock().take()),
            ContextMode::Recording { .. } => Err(ContextError::RecordingAccess),
        }
    }

    fn log_reply(&self, record: &RequestLogRecord<'_>) {
        if let ContextMode::Normal {
            logger,
            extra_logger,
            ..
        } = &self.mode
        {
            logger.log(record);
            extra_logger.log(record);
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.stats.request_finished();
        if let ContextMode::Recording {
            done: Some(done), ..
        } = &self.mode
        {
            done.notify_one();
        }
    }
}

/// Request context carrying the decoded request and typed reply path.
///
/// Composition plus `Deref` stands in for subclassing: routing-facing
/// state lives in the [`RequestContext`] core, while the typed layer owns
/// the request itself and the one-shot reply delivery.
pub struct TypedRequestContext<R: CacheRequest> {
    base: RequestContext,
    /// Taken (and thereby invalidated) at reply time
    request: Mutex<Option<R>>,
    /// One-shot reply delivery supplied by the session layer
    deliver: Mutex<Option<Box<dyn FnOnce(R::Reply) + Send>>>,
    /// One-shot completion hook, fired after the reply is delivered
    on_complete: Mutex<Option<Box<dyn FnOnce(&RequestContext) + Send>>>,
}

impl<R: CacheRequest> TypedRequestContext<R> {
    /// Create a sole-owned context for a decoded request.
    ///
    /// `logger` and `extra_logger` are both mandatory for a normal-mode
    /// context; `deliver` carries the reply back to the issuing session.
    pub fn new(
        stats: Arc<ProxyStats>,
        request: R,
        priority: RequestPriority,
        logger: Box<dyn RequestLogSink>,
        extra_logger: Box<dyn RequestLogSink>,
        deliver: impl FnOnce(R::Reply) + Send + 'static,
    ) -> Self {
        Self {
            base: RequestContext::new(
                stats,
                priority,
                ContextMode::Normal {
                    logger,
                    extra_logger,
                    route_state: Mutex::new(None),
                },
            ),
            request: Mutex::new(Some(request)),
            deliver: Mutex::new(Some(Box::new(deliver))),
            on_complete: Mutex::new(None),
        }
    }

    /// Install a completion hook, fired exactly once after the reply is
    /// delivered. Only callable while the context is still sole-owned.
    pub fn set_on_complete(&mut self, hook: impl FnOnce(&RequestContext) + Send + 'static) {
        *self.on_complete.get_mut() = Some(Box::new(hook));
    }

    /// Convert the context into one ready to route.
    ///
    /// This is the single allowed ownership transition: the sole-owned
    /// value is consumed, the config snapshot is pinned (keeping it alive
    /// for as long as any sub-request needs it), and ownership becomes
    /// shared so that every sub-request keeps the context alive.
    pub fn dispatch(mut self, config: Arc<ProxyConfig>) -> Arc<Self> {
        debug!(
            id = self.base.id,
            generation = config.generation(),
            "dispatching request context"
        );
        self.base.config = Some(config);
        Arc::new(self)
    }

    /// The decoded request, or `None` once the reply has been sent.
    ///
    /// The request is guaranteed to be present until the reply
    /// transition; after that it must not be read again, which the
    /// absence encodes.
    pub fn request(&self) -> Option<MappedMutexGuard<'_, R>> {
        MutexGuard::try_map(self.request.lock(), Option::as_mut).ok()
    }

    /// Send the reply for this request. First caller wins.
    ///
    /// Exactly once per context: sets the replied flag, invalidates the
    /// stored request, logs the completed request through both sinks,
    /// delivers the reply and fires the completion hook. A second call
    /// returns [`ContextError::AlreadyReplied`] and invokes nothing.
    pub fn send_reply(&self, reply: R::Reply, meta: &ReplyMeta) -> Result<(), ContextError> {
        if self
            .base
            .replied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ContextError::AlreadyReplied);
        }

        let request = self.request.lock().take();
        let finished_at = Instant::now();
        if let Some(request) = &request {
            let record = RequestLogRecord {
                pool_name: &meta.pool_name,
                endpoint: &meta.endpoint,
                stripped_routing_prefix: &meta.stripped_routing_prefix,
                request_name: request.name(),
                key_len: request.key().len(),
                reply_result: reply.result_label(),
                started_at: self.base.started_at,
                finished_at,
            };
            self.base.log_reply(&record);
        }
        self.base.stats.reply_sent();

        if let Some(deliver) = self.deliver.lock().take() {
            deliver(reply);
        }
        if let Some(on_complete) = self.on_complete.lock().take() {
            on_complete(&self.base);
        }
        Ok(())
    }
}

impl<R: CacheRequest> Deref for TypedRequestContext<R> {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.base
    }
}

impl<R: CacheRequest> DerefMut for TypedRequestContext<R> {
    fn deref_mut(&mut self) -> &mut RequestContext {
        &mut self.base
    }
}
