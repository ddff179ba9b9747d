//! Per-client rate limiting.
//!
//! One token bucket per remote IP ("visitor"), created on first sight with
//! the parameters of the caller's network class and swept after five idle
//! minutes so an unbounded stream of distinct addresses cannot grow the map
//! without limit.
//!
//! # Locking
//! - The visitor map sits behind one mutex, taken only to look up or create
//!   an entry and to bump `last_seen`, and by the sweep.
//! - Each bucket has its own mutex, so token accounting for one IP never
//!   blocks lookups for another.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::{RateLimitParams, RateLimits};
use crate::observability::metrics;
use crate::security::network::{classify, NetworkClass};

/// Visitors idle longer than this are forgotten.
pub const VISITOR_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Period of the eviction sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// A token bucket: `rate` tokens per second, at most `burst` banked.
/// Starts full.
#[derive(Debug)]
pub struct Limiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl Limiter {
    pub fn new(params: RateLimitParams) -> Self {
        let burst = f64::from(params.burst);
        Self {
            rate: params.rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_update: Instant::now(),
            }),
        }
    }

    /// Take one token if one is available.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();

        // Refill tokens
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }
}

#[derive(Debug)]
struct Visitor {
    limiter: Arc<Limiter>,
    last_seen: Instant,
}

/// Store of per-IP buckets.
#[derive(Debug)]
pub struct RateLimiter {
    visitors: Mutex<HashMap<IpAddr, Visitor>>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            visitors: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Return the bucket for `ip`, creating it on first sight.
    ///
    /// Concurrent first requests from one IP share a single bucket: lookup
    /// and insertion happen under the same lock acquisition.
    pub fn get_or_create(&self, ip: IpAddr) -> Arc<Limiter> {
        let ip = ip.to_canonical();
        let now = Instant::now();
        let mut visitors = self.visitors.lock();

        let visitor = visitors.entry(ip).or_insert_with(|| {
            let class = classify(ip);
            let params = match class {
                NetworkClass::Private => self.limits.internal,
                NetworkClass::Public => self.limits.external,
            };
            tracing::debug!(ip = %ip, class = class.as_str(), rate = params.rate, burst = params.burst, "New visitor");
            Visitor {
                limiter: Arc::new(Limiter::new(params)),
                last_seen: now,
            }
        });
        visitor.last_seen = now;

        Arc::clone(&visitor.limiter)
    }

    /// Admission decision for one request from `ip`.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.get_or_create(ip).allow()
    }

    /// Drop visitors idle for longer than [`VISITOR_IDLE_TIMEOUT`].
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut visitors = self.visitors.lock();
        let before = visitors.len();
        visitors.retain(|_, v| now.duration_since(v.last_seen) <= VISITOR_IDLE_TIMEOUT);
        let removed = before - visitors.len();
        metrics::record_visitors(visitors.len());
        removed
    }

    /// Number of tracked visitors.
    pub fn len(&self) -> usize {
        self.visitors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`sweep`](Self::sweep) every [`SWEEP_INTERVAL`] until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = limiter.len(), "Evicted idle visitors");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Visitor sweep stopping");
                        break;
                    }
                }
            }
        })
    }
}
