use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use opentelemetry_semantic_conventions::{
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
    SCHEMA_URL,
};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::Header,
    Data, Request, Response,
};
use std::time::Instant;
use tonic::metadata::MetadataMap;
use tracing::{info_span, Span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::env::Config;
use crate::TELEMETRY_GUARD;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub struct TelemetryFairing;

struct RequestTrace {
    span: Span,
    started: Instant,
    request_id: String,
}

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "OpenTelemetry",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().to_string();
        let request_id = Uuid::new_v4().to_string();

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.route = request.route().map(|r| r.uri.to_string()),
            request_id = %request_id,
            http.status_code = tracing::field::Empty,
            http.duration_ms = tracing::field::Empty,
        );

        request.local_cache(|| RequestTrace {
            span,
            started: Instant::now(),
            request_id,
        });
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let trace = request.local_cache(|| RequestTrace {
            span: info_span!("http_request"),
            started: Instant::now(),
            request_id: Uuid::new_v4().to_string(),
        });

        let duration = trace.started.elapsed();

        trace.span.record("http.status_code", response.status().code);
        trace
            .span
            .record("http.duration_ms", duration.as_millis() as i64);

        response.set_header(Header::new(REQUEST_ID_HEADER, trace.request_id.clone()));

        let _entered = trace.span.enter();
        tracing::info!(
            "Completed request in {}ms with status {}",
            duration.as_millis(),
            response.status().code
        );
    }
}

fn resource(environment: &str) -> Resource {
    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment.to_string()),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_tracer_provider(endpoint: &str, config: &Config) -> anyhow::Result<SdkTracerProvider> {
    let mut metadata = MetadataMap::new();
    if let Some(api_key) = &config.honeycomb_api_key {
        metadata.insert("x-honeycomb-team", api_key.parse()?);
    }

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata);

    if endpoint.starts_with("https://") {
        builder =
            builder.with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots());
    }

    let exporter = builder.build()?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource(&config.deployment_environment))
        .with_batch_exporter(exporter)
        .build())
}

pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

/// Installs the global subscriber. Spans are exported over OTLP only when an
/// endpoint is configured, otherwise logging stays local.
pub fn init_tracing(config: &Config) -> Option<OtelGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        let _ = registry.try_init();
        return None;
    };

    match init_tracer_provider(endpoint, config) {
        Ok(tracer_provider) => {
            let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));
            let _ = registry.with(OpenTelemetryLayer::new(tracer)).try_init();
            tracing::info!(endpoint, "Exporting traces over OTLP");
            Some(OtelGuard { tracer_provider })
        }
        Err(err) => {
            let _ = registry.try_init();
            tracing::warn!(error = %err, "OTLP exporter unavailable, logging locally only");
            None
        }
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

pub fn shutdown_telemetry() {
    tracing::info!("Shutting down telemetry");

    let guard = match TELEMETRY_GUARD.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    drop(guard);
}
