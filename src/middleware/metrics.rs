//! Prometheus metrics for token issuance and validation.
//!
//! Exposed on `/metrics` in the text exposition format. Each recorder owns
//! its own `Registry`, so several app states can coexist in one process.

use prometheus::{opts, CounterVec, Encoder, IntCounter, Registry, TextEncoder};

use crate::token::TokenError;

pub struct PrometheusRecorder {
    registry: Registry,
    tokens_issued_total: IntCounter,
    validations_total: CounterVec,
}

impl PrometheusRecorder {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tokens_issued_total = IntCounter::with_opts(opts!(
            "tokengate_tokens_issued_total",
            "Total number of tokens issued"
        ))?;
        registry.register(Box::new(tokens_issued_total.clone()))?;

        let validations_total = CounterVec::new(
            opts!(
                "tokengate_validations_total",
                "Token validations by required scope and outcome"
            ),
            &["scope", "outcome"],
        )?;
        registry.register(Box::new(validations_total.clone()))?;

        Ok(Self {
            registry,
            tokens_issued_total,
            validations_total,
        })
    }

    pub fn record_issued(&self) {
        self.tokens_issued_total.inc();
    }

    /// Outcome label is `ok` or the error kind (`expired`, `scope_missing`, ...).
    pub fn record_validation(&self, scope: &str, result: Result<(), &TokenError>) {
        let outcome = match result {
            Ok(()) => "ok",
            Err(e) => e.kind(),
        };
        self.validations_total
            .with_label_values(&[scope, outcome])
            .inc();
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
