use anyhow::{Context as _, Result};
use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn from_mode(mode: &str) -> Self {
        if mode.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }

    pub fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        for<'a> S: Subscriber + LookupSpan<'a>,
    {
        let fmt = tracing_subscriber::fmt::layer().with_thread_names(true);

        match self {
            Self::Json => Box::new(fmt.json().with_target(false)),
            Self::Pretty => Box::new(
                fmt.pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
        }
    }
}

/// `RUST_LOG` picks levels (default `info`), `RUST_LOG_MODE` picks `json` or `pretty`.
pub fn init_tracing() -> Result<()> {
    let log_mode = std::env::var("RUST_LOG_MODE").unwrap_or_else(|_| "pretty".into());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .context("parsing RUST_LOG")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(LogFormat::from_mode(&log_mode).layer())
        .try_init()
        .context("installing tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selects_format() {
        assert_eq!(LogFormat::from_mode("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_mode("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_mode("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_mode("whatever"), LogFormat::Pretty);
    }
}
