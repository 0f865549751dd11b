//! # Prometheus Metrics
//!
//! Operational metrics for the hub, scraped at `/metrics` on the metrics
//! port. Everything is registered in a dedicated [`prometheus::Registry`]
//! under the `pray` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Cheap to clone; the handles share their underlying values.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Knocks that minted tokens.
    pub knocks_total: IntCounter,
    /// Knocks turned away by the cooldown.
    pub knocks_rate_limited_total: IntCounter,
    /// Notes left behind by knocks.
    pub notes_stored_total: IntCounter,
    /// Whole tokens minted.
    pub tokens_minted_total: IntCounter,
    /// Knocks whose mint was not submitted or not confirmed.
    pub mint_failures_total: IntCounter,
    /// Paid peeks served.
    pub peeks_total: IntCounter,
    /// Peeks refused for a missing or wrong burn.
    pub bad_payments_total: IntCounter,
    /// Faucet transfers sent.
    pub faucet_transfers_total: IntCounter,
    /// Time from mint submission to confirmation.
    pub mint_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("pray".into()), None)?;

        let mint_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mint_latency_seconds",
                "Time from mint submission to on-chain confirmation in seconds",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(mint_latency_seconds.clone()))?;

        Ok(Self {
            knocks_total: counter(&registry, "knocks_total", "Knocks that minted tokens")?,
            knocks_rate_limited_total: counter(
                &registry,
                "knocks_rate_limited_total",
                "Knocks rejected by the per-address cooldown",
            )?,
            notes_stored_total: counter(
                &registry,
                "notes_stored_total",
                "Notes stored by knocks",
            )?,
            tokens_minted_total: counter(
                &registry,
                "tokens_minted_total",
                "Whole reward tokens minted",
            )?,
            mint_failures_total: counter(
                &registry,
                "mint_failures_total",
                "Knocks whose mint transaction failed or was not confirmed",
            )?,
            peeks_total: counter(&registry, "peeks_total", "Paid note peeks served")?,
            bad_payments_total: counter(
                &registry,
                "bad_payments_total",
                "Peeks rejected because no matching burn was found",
            )?,
            faucet_transfers_total: counter(
                &registry,
                "faucet_transfers_total",
                "Native-currency faucet transfers sent",
            )?,
            mint_latency_seconds,
            registry,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
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
