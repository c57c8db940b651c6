use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::{Arc, OnceLock};

use crate::state::AppState;

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct StageLabel {
    pub circuit: &'static str,
    pub stage: &'static str, // "compile" | "witness" | "setup" | "prove" | "verify"
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct RunLabel {
    pub circuit: &'static str,
    pub outcome: &'static str, // "ok" | "business_rule" | "error"
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct CircuitLabel {
    pub circuit: &'static str,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct OutcomeLabel {
    pub outcome: &'static str, // "confirmed" | "rejected" | "simulation_failed" | "error"
}

pub struct Metrics {
    registry: Registry,
    pub ready: Gauge<i64>,
    pub stage_ms: Family<StageLabel, Histogram>,
    pub prove_runs_total: Family<RunLabel, Counter>,
    pub compile_skipped_total: Family<CircuitLabel, Counter>,
    pub relay_total: Family<OutcomeLabel, Counter>,
    pub bad_payload_total: Counter,
}

fn buckets_ms() -> Vec<f64> {
    vec![
        10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10_000.0, 20_000.0, 45_000.0,
        90_000.0, 180_000.0, 300_000.0,
    ]
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let mut registry = Registry::default();

        let ready = Gauge::<i64>::default();
        registry.register(
            "zkgate_relayer_ready",
            "Relay authority provisioned (1) or not (0)",
            ready.clone(),
        );

        let stage_ms: Family<StageLabel, Histogram> =
            Family::new_with_constructor(|| Histogram::new(buckets_ms().into_iter()));
        registry.register(
            "zkgate_prove_stage_ms",
            "Pipeline stage duration (ms) by circuit and stage",
            stage_ms.clone(),
        );

        let prove_runs_total: Family<RunLabel, Counter> = Family::default();
        registry.register(
            "zkgate_prove_runs_total",
            "Proof pipeline runs by circuit and outcome",
            prove_runs_total.clone(),
        );

        let compile_skipped_total: Family<CircuitLabel, Counter> = Family::default();
        registry.register(
            "zkgate_compile_skipped_total",
            "Compile stage skipped because artifacts were fresh",
            compile_skipped_total.clone(),
        );

        let relay_total: Family<OutcomeLabel, Counter> = Family::default();
        registry.register(
            "zkgate_relay_total",
            "Relay submissions by outcome",
            relay_total.clone(),
        );

        let bad_payload_total = Counter::default();
        registry.register(
            "zkgate_bad_payload_total",
            "Requests rejected by validation before any work",
            bad_payload_total.clone(),
        );

        Metrics {
            registry,
            ready,
            stage_ms,
            prove_runs_total,
            compile_skipped_total,
            relay_total,
            bad_payload_total,
        }
    })
}

pub fn observe_stage(circuit: &'static str, stage: &'static str, ms: u128) {
    metrics()
        .stage_ms
        .get_or_create(&StageLabel { circuit, stage })
        .observe(ms as f64);
}

pub fn inc_prove_run(circuit: &'static str, outcome: &'static str) {
    metrics()
        .prove_runs_total
        .get_or_create(&RunLabel { circuit, outcome })
        .inc();
}

pub fn inc_compile_skipped(circuit: &'static str) {
    metrics()
        .compile_skipped_total
        .get_or_create(&CircuitLabel { circuit })
        .inc();
}

pub fn inc_relay(outcome: &'static str) {
    metrics()
        .relay_total
        .get_or_create(&OutcomeLabel { outcome })
        .inc();
}

pub fn inc_bad_payload_total() {
    metrics().bad_payload_total.inc();
}

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let m = metrics();
    m.ready.set(if state.has_relayer_key() { 1 } else { 0 });

    let mut out = String::new();
    if let Err(e) = encode(&mut out, &m.registry) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("encode metrics failed: {e}"),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        out,
    )
        .into_response()
}
