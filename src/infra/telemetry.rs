use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Registers descriptions for every metric the crate emits. Safe to call
/// repeatedly; only the first call has an effect.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "inkpost_cache_hit_total",
            Unit::Count,
            "Total number of cache lookups answered from the cache."
        );
        describe_counter!(
            "inkpost_cache_miss_total",
            Unit::Count,
            "Total number of cache lookups that found no entry."
        );
        describe_counter!(
            "inkpost_cache_error_total",
            Unit::Count,
            "Total number of cache operations that failed or timed out, by operation."
        );
        describe_counter!(
            "inkpost_cache_evict_total",
            Unit::Count,
            "Total number of in-memory cache evictions due to capacity."
        );
        describe_counter!(
            "inkpost_view_record_failed_total",
            Unit::Count,
            "Total number of views that could not be recorded."
        );
        describe_counter!(
            "inkpost_analytics_create_retry_total",
            Unit::Count,
            "Total number of retried analytics record creations during ingest."
        );
        describe_histogram!(
            "inkpost_leaderboard_build_ms",
            Unit::Milliseconds,
            "Leaderboard build latency in milliseconds, by board."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let settings = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        };
        init(&settings).expect("first install");
        let err = init(&settings).expect_err("subscriber already installed");
        assert!(matches!(err, InfraError::Telemetry(_)));
    }
}
