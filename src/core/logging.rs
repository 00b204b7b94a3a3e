//! Tracing subscriber setup for the command-line front-end
//!
//! `RUST_LOG` directives take precedence over the `-v` count:
//!
//! ```text
//! RUST_LOG=ipa_buyer=debug ipa-buyer login --email user@example.com
//! ```

use tracing_subscriber::{EnvFilter, fmt};

/// Default filter directive for a `-v` count
pub fn verbosity_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize the global subscriber, writing to stderr
///
/// Calling it again is a no-op; the first subscriber stays installed.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(verbosity)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives_parse() {
        for verbosity in 0..5 {
            let directive = verbosity_directive(verbosity);
            assert!(
                EnvFilter::try_new(directive).is_ok(),
                "failed to parse directive: {}",
                directive
            );
        }
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(verbosity_directive(0), "warn");
        assert_eq!(verbosity_directive(2), "debug");
        assert_eq!(verbosity_directive(9), "trace");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing(0);
        init_tracing(3);
    }
}
