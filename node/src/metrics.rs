//! # Prometheus Metrics
//!
//! Exposes operational metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total airlines admitted (directly or by consensus).
    pub airlines_registered_total: IntCounter,
    /// Total airlines that crossed the funding threshold.
    pub airlines_funded_total: IntCounter,
    /// Total flights registered.
    pub flights_registered_total: IntCounter,
    /// Total insurance policies sold.
    pub policies_sold_total: IntCounter,
    /// Total flight resolutions applied from the oracle path.
    pub flights_resolved_total: IntCounter,
    /// Total withdrawals released to passengers.
    pub payouts_released_total: IntCounter,
    /// Plumes currently owed to passengers across all credit balances.
    pub credits_outstanding: IntGauge,
    /// Plumes currently held in the custody pool.
    pub pool_balance: IntGauge,
    /// 1 while the system is operational, 0 while paused.
    pub operational: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("skybond".into()), None)
            .expect("failed to create prometheus registry");

        let airlines_registered_total = IntCounter::new(
            "airlines_registered_total",
            "Total number of airlines admitted",
        )
        .expect("metric creation");
        registry
            .register(Box::new(airlines_registered_total.clone()))
            .expect("metric registration");

        let airlines_funded_total = IntCounter::new(
            "airlines_funded_total",
            "Total number of airlines that crossed the funding threshold",
        )
        .expect("metric creation");
        registry
            .register(Box::new(airlines_funded_total.clone()))
            .expect("metric registration");

        let flights_registered_total = IntCounter::new(
            "flights_registered_total",
            "Total number of flights registered",
        )
        .expect("metric creation");
        registry
            .register(Box::new(flights_registered_total.clone()))
            .expect("metric registration");

        let policies_sold_total = IntCounter::new(
            "policies_sold_total",
            "Total number of insurance policies sold",
        )
        .expect("metric creation");
        registry
            .register(Box::new(policies_sold_total.clone()))
            .expect("metric registration");

        let flights_resolved_total = IntCounter::new(
            "flights_resolved_total",
            "Total number of oracle resolutions applied",
        )
        .expect("metric creation");
        registry
            .register(Box::new(flights_resolved_total.clone()))
            .expect("metric registration");

        let payouts_released_total = IntCounter::new(
            "payouts_released_total",
            "Total number of passenger withdrawals released",
        )
        .expect("metric creation");
        registry
            .register(Box::new(payouts_released_total.clone()))
            .expect("metric registration");

        let credits_outstanding = IntGauge::new(
            "credits_outstanding_plumes",
            "Plumes currently owed to passengers",
        )
        .expect("metric creation");
        registry
            .register(Box::new(credits_outstanding.clone()))
            .expect("metric registration");

        let pool_balance = IntGauge::new(
            "pool_balance_plumes",
            "Plumes currently held in the custody pool",
        )
        .expect("metric creation");
        registry
            .register(Box::new(pool_balance.clone()))
            .expect("metric registration");

        let operational = IntGauge::new(
            "operational",
            "1 while the system is operational, 0 while paused",
        )
        .expect("metric creation");
        registry
            .register(Box::new(operational.clone()))
            .expect("metric registration");

        Self {
            registry,
            airlines_registered_total,
            airlines_funded_total,
            flights_registered_total,
            policies_sold_total,
            flights_resolved_total,
            payouts_released_total,
            credits_outstanding,
            pool_balance,
            operational,
        }
    }

    /// Refresh the gauges that mirror pool state.
    pub fn observe_pool(&self, pool: &skybond_contracts::SuretyPool) {
        self.credits_outstanding
            .set(pool.state().total_outstanding_credit().min(i64::MAX as u64) as i64);
        self.pool_balance
            .set(pool.state().pool_balance().min(i64::MAX as u64) as i64);
        self.operational.set(i64::from(pool.is_operational()));
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
