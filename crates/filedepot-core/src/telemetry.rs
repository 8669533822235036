use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with an env-filtered fmt subscriber.
///
/// `RUST_LOG` overrides the default filter. Call once at process startup.
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "filedepot=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Telemetry initialized");
    Ok(())
}
