//! Tracing subscriber setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Environment, Settings};

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }

    pub fn default_for(env: &Environment) -> Self {
        if env.is_prod() {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Filter used when `RUST_LOG` is unset
fn default_directives(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "boq_estimation=debug,tower_http=debug,sqlx=warn,info",
        Environment::Staging => "boq_estimation=debug,tower_http=info,sqlx=warn,info",
        Environment::Prod => "boq_estimation=info,tower_http=info,sqlx=warn,warn",
    }
}

pub fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&settings.env)));

    let source_location = settings.env.is_dev();
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(source_location)
        .with_line_number(source_location);

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry.with(fmt_layer.json().flatten_event(true)).init(),
        LogFormat::Pretty => registry.with(fmt_layer.pretty()).init(),
        LogFormat::Compact => registry.with(fmt_layer.compact()).init(),
    }

    tracing::info!(
        service = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        env = ?settings.env,
        format = ?settings.log_format,
        "Logging initialized"
    );
}
