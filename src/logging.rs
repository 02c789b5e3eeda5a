use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Overrides the `--quiet` / `--verbose` level when set, e.g. `lazy_django=trace`.
pub const LOG_ENV: &str = "LAZY_DJANGO_LOG";

pub fn default_level(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Log to stderr so command output on stdout stays clean.
pub fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level(quiet, verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
