/*!
 * # Metrics
 *
 * Prometheus counters for the checkout pipeline, exposed in text format at
 * `/metrics`. All collectors live in one registry owned by this module.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ORDERS_CREATED: IntCounter = register(
        IntCounter::new("luxemart_orders_created_total", "Total number of orders created")
            .expect("metric can be created")
    );
    pub static ref ORDER_CREATION_FAILURES: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "luxemart_order_creation_failures_total",
                "Failed order creations by reason"
            ),
            &["reason"]
        )
        .expect("metric can be created")
    );
    pub static ref PAYMENT_CALLBACKS: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "luxemart_payment_callbacks_total",
                "Payment gateway callbacks by outcome"
            ),
            &["outcome"]
        )
        .expect("metric can be created")
    );
    pub static ref SIGNATURE_FAILURES: IntCounter = register(
        IntCounter::new(
            "luxemart_payment_signature_failures_total",
            "Callbacks rejected because the signature did not verify"
        )
        .expect("metric can be created")
    );
}

fn register<C>(collector: C) -> C
where
    C: prometheus::core::Collector + Clone + 'static,
{
    if let Err(e) = REGISTRY.register(Box::new(collector.clone())) {
        error!(error = %e, "failed to register metric");
    }
    collector
}

/// Callback outcome labels
pub mod outcome {
    pub const PAID: &str = "paid";
    pub const FAILED: &str = "failed";
    pub const DUPLICATE: &str = "duplicate";
    pub const REJECTED: &str = "rejected";
}

pub fn record_order_created() {
    ORDERS_CREATED.inc();
}

pub fn record_order_failure(reason: &str) {
    ORDER_CREATION_FAILURES.with_label_values(&[reason]).inc();
}

pub fn record_callback(outcome: &str) {
    PAYMENT_CALLBACKS.with_label_values(&[outcome]).inc();
}

pub fn record_signature_failure() {
    SIGNATURE_FAILURES.inc();
}

/// Renders every registered collector in Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    // Touch the lazies so families appear before their first increment.
    lazy_static::initialize(&ORDERS_CREATED);
    lazy_static::initialize(&ORDER_CREATION_FAILURES);
    lazy_static::initialize(&PAYMENT_CALLBACKS);
    lazy_static::initialize(&SIGNATURE_FAILURES);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
