mod alert_layer;
mod config;
mod discord;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use alert_layer::AlertLayer;
use config::ObservabilityConfig;
use discord::DiscordAlertSink;

/// Installs the global subscriber for one binary. Call once, inside the tokio runtime.
pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);

    let alert_layer = config.discord.as_ref().map(|discord| {
        let sink = DiscordAlertSink::spawn(discord.webhook_url.clone());
        AlertLayer::new(sink, config.service.clone())
            .with_filter(LevelFilter::from_level(discord.min_level))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Local offset so operators in Asia/Seoul read +09:00 stamps.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    for warning in &config.warnings {
        warn!(
            component = %config.service.component,
            warning = %warning,
            "observability: config warning"
        );
    }

    info!(
        service = %config.service.service_name,
        environment = %config.service.environment,
        component = %config.service.component,
        discord_alerts = config.discord.is_some(),
        "observability: initialized"
    );

    Ok(())
}
