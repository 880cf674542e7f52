use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `AMORA_LOG_FORMAT` wins; otherwise production logs JSON.
    pub fn resolve(log_format: Option<&str>, env: Option<&str>) -> Self {
        match log_format.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Self::Json,
            Some("pretty") => Self::Pretty,
            _ if env == Some("production") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Default directive set when `RUST_LOG` is unset.
pub fn default_directives(service_name: &str) -> String {
    let crate_target = service_name.replace('-', "_");
    format!("info,{crate_target}=debug,tower_http=debug,lapin=warn")
}

pub fn init_tracing(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    let format = LogFormat::resolve(
        std::env::var("AMORA_LOG_FORMAT").ok().as_deref(),
        std::env::var("AMORA_ENV").ok().as_deref(),
    );

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true).with_target(true))
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
    }

    tracing::info!(service = service_name, ?format, "tracing initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_format_beats_environment() {
        assert_eq!(LogFormat::resolve(Some("pretty"), Some("production")), LogFormat::Pretty);
        assert_eq!(LogFormat::resolve(Some("JSON"), None), LogFormat::Json);
        assert_eq!(LogFormat::resolve(None, Some("production")), LogFormat::Json);
        assert_eq!(LogFormat::resolve(None, None), LogFormat::Pretty);
    }

    #[test]
    fn service_target_uses_crate_name() {
        assert!(default_directives("amora-lifecycle").contains("amora_lifecycle=debug"));
    }
}
