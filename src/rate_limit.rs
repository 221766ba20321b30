//! Per-client request budget
//!
//! Sliding-log limiter: each client keeps the instants of its admitted
//! requests inside the window. Requests over budget are rejected, never
//! queued.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Result of asking for one request's worth of budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted { remaining: u32 },
    Rejected { retry_after: Duration },
}

/// Whole seconds for a `Retry-After` header, never zero
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 || secs == 0 {
        secs + 1
    } else {
        secs
    }
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    /// Sharded per-client logs; clients only contend within a shard
    clients: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, DEFAULT_WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Admit or reject one request from `client` arriving at `now`
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut log = self.clients.entry(client.to_string()).or_default();
        expire(&mut log, now, self.window);

        let used = u32::try_from(log.len()).unwrap_or(u32::MAX);
        if used >= self.limit {
            let retry_after = log.front().map_or(self.window, |oldest| {
                (*oldest + self.window).saturating_duration_since(now)
            });
            return RateDecision::Rejected { retry_after };
        }

        log.push_back(now);
        RateDecision::Admitted {
            remaining: self.limit - used - 1,
        }
    }

    /// Drop clients with no requests inside the window; returns how many
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, log| {
            expire(log, now, self.window);
            !log.is_empty()
        });
        before.saturating_sub(self.clients.len())
    }

    #[allow(dead_code)] // Used in tests
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Periodically sweep idle clients until `cancel` fires
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Rate limiter sweeper stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        let removed = limiter.sweep_at(Instant::now());
                        if removed > 0 {
                            tracing::debug!(removed, "Swept idle rate limit entries");
                        }
                    }
                }
            }
        })
    }
}

fn expire(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while log
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= window)
    {
        log.pop_front();
    }
}
