use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// Logs go to stderr so stdout carries nothing but file data. `FILEPIPE_LOG`
/// takes precedence over the level implied by `verbose`.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "filepipe=debug" } else { "filepipe=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("FILEPIPE_LOG").unwrap_or(EnvFilter::new(level)))
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(anyhow::Error::msg)?;

    debug!("Logging system initialized successfully");
    Ok(())
}
