//! Logging prelude and subscriber setup
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Host listening on {}", addr);
//! warn!("Connection to {} terminated: {}", peer, e);
//! ```

pub use tracing::{debug, error, info, warn};

/// Install the stderr subscriber.
///
/// INFO and above by default; `RUST_LOG` overrides the filter:
///
/// ```bash
/// RUST_LOG=debug lansync serve
/// RUST_LOG=lansync::protocol=debug,lansync::transfer=debug lansync sync 10.0.0.2 notes.txt
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
