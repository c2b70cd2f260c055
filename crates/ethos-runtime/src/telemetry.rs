//! Tracing subscriber setup for Ethos binaries.
//!
//! Call [`init_tracing`] once at process startup.  Library crates only emit
//! `tracing` events; this is the single place a subscriber is installed.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ETHOS_LOG_FORMAT=json` | Emit newline-delimited JSON logs instead of the compact format. |
//! | `ETHOS_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set, spans such as `decide_and_record` are exported over OTLP/HTTP. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Used when `ETHOS_OTLP_ENDPOINT` is unset or blank. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = ethos_runtime::telemetry::init_tracing("ethos");
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read `ETHOS_LOG_FORMAT`; anything other than `json` means compact.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("ETHOS_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Install the global subscriber: env filter, console layer in the
/// [`LogFormat`] from the environment, and an OTLP layer when an endpoint is
/// configured.
///
/// A second call (e.g. from tests) leaves the first subscriber in place.
/// Hold the returned guard for the lifetime of the process.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env();
    let provider = build_provider(service_name);

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("ethos")));
    let json_layer =
        (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());
    let compact_layer =
        (format == LogFormat::Compact).then(|| tracing_subscriber::fmt::layer().compact());

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[ethos] tracing subscriber already installed: {e}");
    }

    TelemetryGuard(provider)
}

/// Shuts the OTLP provider down on drop, flushing pending spans.
pub struct TelemetryGuard(Option<SdkTracerProvider>);

impl TelemetryGuard {
    /// Whether spans are being exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[ethos] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// The collector endpoint, preferring `ETHOS_OTLP_ENDPOINT`.  Blank values
/// count as unset.
fn otlp_endpoint(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["ETHOS_OTLP_ENDPOINT", "OTEL_EXPORTER_OTLP_ENDPOINT"]
        .into_iter()
        .filter_map(|var| lookup(var))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// `None` when no endpoint is configured or the exporter fails to build.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = otlp_endpoint(|var| std::env::var(var).ok())?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.as_str())
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[ethos] cannot export decision spans to {endpoint}: {e}");
            return None;
        }
    };

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    // Decisions are made synchronously; there is no runtime for a batch exporter.
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
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == var)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn ethos_endpoint_wins_and_blank_is_unset() {
        assert_eq!(otlp_endpoint(env(&[])), None);
        assert_eq!(
            otlp_endpoint(env(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel:4318")])),
            Some("http://otel:4318".to_string())
        );
        assert_eq!(
            otlp_endpoint(env(&[
                ("ETHOS_OTLP_ENDPOINT", " http://ethos:4318 "),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel:4318"),
            ])),
            Some("http://ethos:4318".to_string())
        );
        assert_eq!(
            otlp_endpoint(env(&[
                ("ETHOS_OTLP_ENDPOINT", "  "),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel:4318"),
            ])),
            Some("http://otel:4318".to_string())
        );
    }

    #[test]
    fn init_without_endpoint_does_not_export() {
        // SAFETY: no other test in this crate reads these variables.
        unsafe {
            std::env::remove_var("ETHOS_OTLP_ENDPOINT");
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
        assert!(build_provider("ethos-test").is_none());
        let first = init_tracing("ethos-test");
        let second = init_tracing("ethos-test");
        assert!(!first.exporting());
        assert!(!second.exporting());
    }
}
