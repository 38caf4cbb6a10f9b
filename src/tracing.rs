use std::io::IsTerminal;

use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Logs go to stderr so stdout only carries command output such as the run
/// summary; colors are dropped when stderr is redirected to a file.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
