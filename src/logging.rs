//! Tracing setup for hosts embedding the engine.
//!
//! The engine itself only emits events; installing a subscriber is the host's call. Clamped
//! values and rejected records are logged under the `data_quality` target so they can be routed
//! separately, e.g. `RUST_LOG=info,data_quality=warn`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, prelude::*, util::SubscriberInitExt};

pub const DATA_QUALITY_TARGET: &str = "data_quality";

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`). Returns false when a global
/// subscriber was already set, which is expected when tests call this repeatedly.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(true).with_line_number(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

/// Same as [`init_tracing`] with an explicit level and output format (`json`, `pretty`, or
/// compact text for anything else).
pub fn init_tracing_with(level: &str, format: &str) -> bool {
    let env_filter = EnvFilter::new(level);
    let fmt_layer = match format {
        "json" => fmt::layer().json().with_target(true).boxed(),
        "pretty" => fmt::layer().pretty().with_target(true).boxed(),
        _ => fmt::layer().compact().with_target(true).boxed(),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
