// Logging: tracing subscriber setup and session transcripts

pub mod transcript;

pub use transcript::{TranscriptEntry, TranscriptLogger};

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "specforge=info";
const VERBOSE_FILTER: &str = "specforge=debug";

/// Install the global fmt subscriber. `RUST_LOG` wins over the defaults.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
