// SPDX-License-Identifier: MIT

//! Diagnostic logging.
//!
//! Logs go to standard error so that standard output only ever carries the
//! failure message.  Silent unless `STAGEXEC_LOG` holds a filter directive.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter, e.g. `stagexec=debug`.
pub const LOG_ENV: &str = "STAGEXEC_LOG";

/// Install the global subscriber.  Does nothing if one is already set.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("off"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
