use std::env;

use tracing::Level;
use url::Url;

#[derive(Debug, Clone)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone)]
pub(crate) struct DiscordConfig {
    pub(crate) webhook_url: Url,
    pub(crate) min_level: Level,
}

pub(crate) struct ObservabilityConfig {
    pub(crate) service: ServiceContext,
    pub(crate) discord: Option<DiscordConfig>,
    /// Logged once the subscriber is installed.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    fn from_lookup(component: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let component = component.trim().to_string();

        let service = ServiceContext {
            service_name: non_empty("SERVICE_NAME").unwrap_or_else(|| component.clone()),
            environment: non_empty("STAGE").unwrap_or_else(|| "unknown".to_string()),
            component,
        };

        let mut warnings = Vec::new();
        let enabled = non_empty("DISCORD_NOTIFY_ENABLED")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(true);

        let webhook_url = match non_empty("DISCORD_WEBHOOK_URL") {
            Some(raw) if enabled => match Url::parse(raw.trim()) {
                Ok(url) => Some(url),
                Err(err) => {
                    // The raw value embeds the webhook token; report only the parse error.
                    warnings.push(format!(
                        "DISCORD_WEBHOOK_URL is invalid, alerts disabled ({err})"
                    ));
                    None
                }
            },
            _ => None,
        };

        let discord = webhook_url.map(|webhook_url| {
            let min_level = match non_empty("DISCORD_NOTIFY_LEVEL") {
                Some(raw) => parse_level(&raw).unwrap_or_else(|| {
                    warnings.push(format!(
                        "DISCORD_NOTIFY_LEVEL {raw:?} is not a level, using ERROR"
                    ));
                    Level::ERROR
                }),
                None => Level::ERROR,
            };
            DiscordConfig {
                webhook_url,
                min_level,
            }
        });

        Self {
            service,
            discord,
            warnings,
        }
    }
}

fn parse_level(input: &str) -> Option<Level> {
    match input.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
