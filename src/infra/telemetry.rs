use std::{io, sync::Once};

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
///
/// Events go to stderr; stdout is reserved for rendered output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "texsvg_render_cache_hit_total",
            Unit::Count,
            "Total number of renders served from the SVG cache."
        );
        describe_counter!(
            "texsvg_render_cache_miss_total",
            Unit::Count,
            "Total number of renders that had to invoke the toolchain."
        );
        describe_counter!(
            "texsvg_render_cache_error_total",
            Unit::Count,
            "Total number of cache reads or writes that failed, labelled by op."
        );
        describe_counter!(
            "texsvg_render_failure_total",
            Unit::Count,
            "Total number of failed renders, labelled by stage."
        );
        describe_histogram!(
            "texsvg_render_stage_ms",
            Unit::Milliseconds,
            "Toolchain stage latency in milliseconds, labelled by stage."
        );
    });
}
