use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count. `RUST_LOG` overrides it.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "mailsweep=info",
        2 => "mailsweep=debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// machine readable under `--json`.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .try_init();
}
