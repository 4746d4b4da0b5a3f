use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install a console `tracing` subscriber honouring `RUST_LOG` (defaults to `info`).
///
/// Safe to call repeatedly; only the first call installs the subscriber, and an already
/// installed global subscriber (e.g. from the host application) is left untouched.
pub fn init_tracing() {
  INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
      .with_env_filter(filter)
      .with_target(false)
      .compact()
      .try_init();
  });
}
