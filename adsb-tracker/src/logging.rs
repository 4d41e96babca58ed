//! Log setup. Everything goes to stderr so stdout stays clean for tables
//! and JSON event lines.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "adsb_engine=debug,adsb_track=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
