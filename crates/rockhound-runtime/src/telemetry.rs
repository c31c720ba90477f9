//! Tracing initialisation for rockhound binaries.
//!
//! Call [`init_tracing`] once at process startup.  It installs a
//! `tracing-subscriber` registry with a console formatter and, when a
//! collector is configured, an OpenTelemetry span exporter, so the per-tick
//! `tick` spans of the control loop can be inspected in any OTLP backend.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ROCKHOUND_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL (e.g. `http://localhost:4318`). Enables span export. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Keep the guard alive until the process exits.
//! let _guard = rockhound_runtime::telemetry::init_tracing("rockhound");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Selects the JSON formatter when set to `json`.
pub const LOG_FORMAT_ENV: &str = "ROCKHOUND_LOG_FORMAT";

// ────────────────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber.
///
/// The OTLP layer is only added when `OTEL_EXPORTER_OTLP_ENDPOINT` is set
/// and the exporter builds; otherwise logging goes to the console alone.
///
/// Hold the returned [`TracerProviderGuard`] for the life of the process:
/// dropping it flushes and shuts down the exporter.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if json_requested() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("rockhound")));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter)
        .init();

    TracerProviderGuard(provider)
}

// ────────────────────────────────────────────────────────────────────────────
// RAII guard
// ────────────────────────────────────────────────────────────────────────────

/// Shuts the OTel [`SdkTracerProvider`] down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[rockhound] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn json_requested() -> bool {
    std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Build a provider when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.  Exporter
/// failures are reported on stderr, since no subscriber exists yet.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[rockhound] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // The control loop is synchronous; the simple exporter needs no runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_provider_without_endpoint() {
        // SAFETY: single-threaded test; no other thread reads this env-var.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("rockhound-test").is_none());
    }

    #[test]
    fn json_format_is_opt_in() {
        // SAFETY: single-threaded test; no other thread reads this env-var.
        unsafe { std::env::set_var(LOG_FORMAT_ENV, "JSON") };
        assert!(json_requested());
        // SAFETY: as above.
        unsafe { std::env::set_var(LOG_FORMAT_ENV, "pretty") };
        assert!(!json_requested());
        // SAFETY: as above.
        unsafe { std::env::remove_var(LOG_FORMAT_ENV) };
        assert!(!json_requested());
    }

    #[test]
    fn empty_guard_drops_cleanly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
