//! Log setup for `build_api`.
//!
//! Requests and responses travel through the `--input-json`/`--output-json`
//! files, so logs go to stderr where the calling tool collects them. A
//! bridged call runs a second `build_api` inside the chroot whose stderr is
//! inherited, so both halves of one call end up in the same stream.

use std::io;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the stderr subscriber. `RUST_LOG` overrides `level`; `json`
/// switches to one JSON object per line. Only the first call per process
/// takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let lines = fmt::layer().with_target(false).with_writer(io::stderr);
    let lines = if json {
        lines.json().boxed()
    } else {
        lines.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(lines)
        .try_init()
        .ok();
}
