//! Tracing subscriber setup shared by nodes and test harnesses.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::runtime_config::LoggingOptions;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `options.level`. Returns `false` when a subscriber
/// was already installed, which makes repeated calls from tests harmless.
pub fn init_tracing(options: &LoggingOptions) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if options.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    }
}
