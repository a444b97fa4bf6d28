use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Emit an event inside a span named after its channel
#[macro_export]
macro_rules! channel_event {
    ($level:expr, $channel:expr, $($msg:expr),*) => {{
        let channel = $crate::tracing::span!($level, $channel);
        let _guard = channel.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Log a message handed to a transport
#[macro_export]
macro_rules! outbound {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::channel_event!($crate::tracing::Level::$level, "outbound", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outbound!(level = TRACE, $($msg),*)
    };
}

/// Log engine bookkeeping: ticks, run transitions, startup
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::channel_event!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// The level named by `LOG_LEVEL`, if it names one
fn parse_level(raw: Option<&str>) -> Result<LevelFilter, String> {
    raw.map_or(Ok(default_level()), |raw| {
        LevelFilter::from_str(raw.trim()).map_err(|_| raw.to_string())
    })
}

/// Install the global subscriber.
///
/// `LOG_LEVEL` picks the level (TRACE in debug builds, INFO in release when
/// unset). `NO_COLOR` turns off ANSI colours. Only `cadence*` targets are
/// emitted, and calling this twice keeps the first subscriber.
pub fn init() {
    let raw = std::env::var("LOG_LEVEL").ok();
    let level = parse_level(raw.as_deref()).unwrap_or_else(|bad| {
        eprintln!(
            "Invalid log level specified {bad}, defaulting to {}",
            default_level()
        );
        default_level()
    });

    let fmt = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    drop(
        tracing_subscriber::Registry::default()
            .with(
                fmt.with_filter(level)
                    .with_filter(FilterFn::new(|metadata| {
                        metadata.target().starts_with("cadence")
                    })),
            )
            .try_init(),
    );
}
