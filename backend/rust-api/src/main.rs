use anyhow::Context;
use coursehub_api::{
    config::{Config, StoreBackend},
    create_router,
    services::{payment_gateway::RazorpayGateway, seed, AppState},
    store::{DocumentStore, MemoryStore, MongoStore},
};
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OpenTelemetry export only when an OTLP endpoint is configured
    let telemetry = init_telemetry()?;
    let (tracer, provider) = match telemetry {
        Some((tracer, provider)) => (Some(tracer), Some(provider)),
        None => (None, None),
    };

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursehub_api=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
        .init();

    tracing::info!("Starting CourseHub API");

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Mongo => {
            let store = MongoStore::connect(&config.mongo_uri, &config.mongo_database)
                .await
                .context("Failed to connect to MongoDB")?;
            tracing::info!(database = %config.mongo_database, "MongoDB connected");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    seed::bootstrap(&config, store.as_ref())
        .await
        .context("Failed to seed users")?;

    let gateway = Arc::new(RazorpayGateway::new(config.payment.clone())?);
    let redis_uri = config.redis_uri.clone();
    let bind_addr = config.bind_addr.clone();

    let mut state = AppState::new(config, store, gateway);
    if let Some(uri) = redis_uri {
        match AppState::connect_redis(&uri).await {
            Ok(redis) => state = state.with_redis(redis),
            Err(e) => tracing::warn!(error = %e, "Redis unavailable, login throttling disabled"),
        }
    }

    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(provider) = provider {
        tracing::info!("Shutting down OpenTelemetry");
        if let Err(e) = provider.shutdown() {
            eprintln!("OpenTelemetry shutdown failed: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

fn init_telemetry() -> anyhow::Result<Option<(Tracer, SdkTracerProvider)>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let Ok(otlp_endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let resource = Resource::builder_empty()
        .with_service_name("coursehub-api")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("coursehub-api");
    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(Some((tracer, provider)))
}
