use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::Filter;
use crate::context::Context;
use crate::message::Message;
use crate::session::Session;

/// Per-route counters shared by a pair of [`MetricsFilter`]s.
///
/// Keys are raw route strings. All counters use relaxed atomics; readers see
/// eventually consistent values.
#[derive(Debug, Default)]
pub struct RouteMetrics {
    routes: DashMap<String, RouteCounters>,
}

#[derive(Debug, Default)]
struct RouteCounters {
    received: AtomicU64,
    handled: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of one route's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RouteStats {
    /// Messages that reached the before chain
    pub received: u64,
    /// Messages whose handler ran and reached the after chain
    pub handled: u64,
    /// Sum of request-id age at the after chain, in milliseconds
    pub total_latency_ms: u64,
}

impl RouteStats {
    /// Mean time from dispatch to the after chain, zero when nothing was handled.
    #[must_use]
    pub fn average_latency_ms(&self) -> u64 {
        if self.handled == 0 {
            0
        } else {
            self.total_latency_ms / self.handled
        }
    }
}

impl RouteMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_received(&self, route: &str) {
        if let Some(c) = self.routes.get(route) {
            c.received.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.routes
            .entry(route.to_string())
            .or_default()
            .received
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_handled(&self, route: &str, latency_ms: u64) {
        let counters = self.routes.entry(route.to_string()).or_default();
        counters.handled.fetch_add(1, Ordering::Relaxed);
        counters
            .total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    #[must_use]
    pub fn route(&self, route: &str) -> Option<RouteStats> {
        self.routes.get(route).map(|c| RouteStats {
            received: c.received.load(Ordering::Relaxed),
            handled: c.handled.load(Ordering::Relaxed),
            total_latency_ms: c.total_latency_ms.load(Ordering::Relaxed),
        })
    }

    /// All routes seen so far, unordered.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, RouteStats)> {
        self.routes
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    entry.key().clone(),
                    RouteStats {
                        received: c.received.load(Ordering::Relaxed),
                        handled: c.handled.load(Ordering::Relaxed),
                        total_latency_ms: c.total_latency_ms.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    #[must_use]
    pub fn total_received(&self) -> u64 {
        self.routes
            .iter()
            .map(|c| c.received.load(Ordering::Relaxed))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Handled,
}

/// Counting filter. Never rejects.
///
/// Install [`MetricsFilter::received`] as a before-filter and
/// [`MetricsFilter::handled`] as an after-filter over the same
/// [`RouteMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsFilter {
    metrics: Arc<RouteMetrics>,
    stage: Stage,
}

impl MetricsFilter {
    #[must_use]
    pub fn received(metrics: Arc<RouteMetrics>) -> Self {
        Self {
            metrics,
            stage: Stage::Received,
        }
    }

    #[must_use]
    pub fn handled(metrics: Arc<RouteMetrics>) -> Self {
        Self {
            metrics,
            stage: Stage::Handled,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<RouteMetrics> {
        &self.metrics
    }
}

impl Filter for MetricsFilter {
    fn call(&self, ctx: &Context, _session: &Arc<dyn Session>, message: &Message) -> bool {
        match self.stage {
            Stage::Received => self.metrics.record_received(&message.route),
            Stage::Handled => {
                let latency_ms = ctx.request_id().elapsed_ms();
                self.metrics.record_handled(&message.route, latency_ms);
            }
        }
        true
    }

    fn name(&self) -> &str {
        match self.stage {
            Stage::Received => "metrics.received",
            Stage::Handled => "metrics.handled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::NullSession;

    #[test]
    fn test_received_and_handled_counts() {
        let metrics = Arc::new(RouteMetrics::new());
        let before = MetricsFilter::received(Arc::clone(&metrics));
        let after = MetricsFilter::handled(Arc::clone(&metrics));
        let session = NullSession::shared("s1");
        let ctx = Context::new();
        let join = Message::new(1, "game.room.join", Vec::new());
        let leave = Message::new(2, "game.room.leave", Vec::new());

        assert!(before.call(&ctx, &session, &join));
        assert!(before.call(&ctx, &session, &join));
        assert!(after.call(&ctx, &session, &join));
        assert!(before.call(&ctx, &session, &leave));

        let join_stats = metrics.route("game.room.join").unwrap();
        assert_eq!(join_stats.received, 2);
        assert_eq!(join_stats.handled, 1);
        assert_eq!(metrics.route("game.room.leave").unwrap().handled, 0);
        assert_eq!(metrics.total_received(), 3);
        assert_eq!(metrics.snapshot().len(), 2);
        assert!(metrics.route("game.room.kick").is_none());
        assert_eq!(before.name(), "metrics.received");
    }

    #[test]
    fn test_average_latency_without_samples() {
        assert_eq!(RouteStats::default().average_latency_ms(), 0);
        let stats = RouteStats {
            received: 4,
            handled: 2,
            total_latency_ms: 10,
        };
        assert_eq!(stats.average_latency_ms(), 5);
    }
}
