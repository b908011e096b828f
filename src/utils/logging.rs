use tracing::Level;

use crate::config::LogSettings;

/// Installs the global fmt subscriber, filtered at `log.level`.
///
/// Unknown level names fall back to `info` so a typo in the config never
/// stops the hub from starting.
pub fn init(settings: &LogSettings) {
    // try_init: tests call this more than once per process
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level(&settings.level))
        .with_target(false)
        .try_init();
}

pub(crate) fn max_level(name: &str) -> Level {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse().unwrap_or(Level::INFO),
    }
}
