//! Inicialização do `tracing` para o binário.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Instala o subscriber global, escrevendo em stderr.
///
/// `RUST_LOG` tem precedência; sem ele vale `--verbose` (debug) ou o
/// `log_filter` da configuração.
pub fn init(config_filter: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { config_filter };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
