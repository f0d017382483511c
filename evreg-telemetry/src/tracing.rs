use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global tracing subscriber for the named service.
///
/// The filter is taken from `RUST_LOG` when set, otherwise `info` for the
/// service and `warn` for everything else. Pretty output is used when stdout
/// is a terminal, JSON lines otherwise, so log aggregation gets structured
/// records in deployment without making local runs unreadable.
pub fn init_tracing(service_name: &str) -> Result<(), TryInitError> {
    // Tracing targets use the crate name, where hyphens become underscores.
    let target = service_name.replace('-', "_");
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{target}=info,evreg=info")));

    let registry = tracing_subscriber::registry().with(env_filter);

    if std::io::stdout().is_terminal() {
        registry.with(fmt::layer()).try_init()
    } else {
        registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init()
    }
}
