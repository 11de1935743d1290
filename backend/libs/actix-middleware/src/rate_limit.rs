//! Per-address admission control.
//!
//! Every source address gets its own token bucket (GCRA via `governor`),
//! allocated on first sight. Addresses idle for longer than `idle_after`
//! are evicted by a background sweeper.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use dashmap::DashMap;
use futures::future::LocalBoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::future::{ready, Ready};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Tokens refilled per second.
    pub per_second: u32,
    /// Bucket capacity.
    pub burst: u32,
    pub idle_after: Duration,
    pub sweep_every: Duration,
}

/// Floor for the sweep period; `tokio::time::interval` panics on zero.
const MIN_SWEEP_EVERY: Duration = Duration::from_millis(1);

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 5,
            burst: 10,
            idle_after: Duration::from_secs(60),
            sweep_every: Duration::from_secs(30),
        }
    }
}

impl RateLimitConfig {
    fn quota(&self) -> Quota {
        let per_second = NonZeroU32::new(self.per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(per_second).allow_burst(burst)
    }
}

struct Visitor {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

/// Table of visitors keyed by source address.
pub struct VisitorTable {
    quota: Quota,
    idle_after: Duration,
    sweep_every: Duration,
    visitors: DashMap<String, Visitor>,
}

impl VisitorTable {
    pub fn new(config: &RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            quota: config.quota(),
            idle_after: config.idle_after,
            sweep_every: config.sweep_every,
            visitors: DashMap::new(),
        })
    }

    /// Take one token for `address`; false when the bucket is empty.
    pub fn admit(&self, address: &str) -> bool {
        let mut visitor = self
            .visitors
            .entry(address.to_string())
            .or_insert_with(|| Visitor {
                limiter: RateLimiter::direct(self.quota),
                last_seen: Instant::now(),
            });
        visitor.last_seen = Instant::now();
        visitor.limiter.check().is_ok()
    }

    /// Drop visitors not seen within the idle window. Returns how many went.
    pub fn sweep(&self) -> usize {
        let before = self.visitors.len();
        let idle_after = self.idle_after;
        self.visitors
            .retain(|_, visitor| visitor.last_seen.elapsed() <= idle_after);
        before.saturating_sub(self.visitors.len())
    }

    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Run `sweep` on a fixed tick until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(table.sweep_every.max(MIN_SWEEP_EVERY));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = table.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = table.len(), "swept idle visitors");
                }
            }
        })
    }
}

/// Rejects requests over the per-address budget with an empty 429.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    table: Arc<VisitorTable>,
}

impl RateLimitMiddleware {
    pub fn new(table: Arc<VisitorTable>) -> Self {
        Self { table }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service,
            table: self.table.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: S,
    table: Arc<VisitorTable>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let address = client_address(&req);

        if !self.table.admit(&address) {
            warn!(address = %address, "rate limit exceeded");
            let res = req.into_response(HttpResponse::TooManyRequests().finish());
            return Box::pin(async move { Ok(res.map_into_right_body()) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
    }
}

/// Peer IP of the connection, or an empty string when unknown.
pub fn client_address(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}
