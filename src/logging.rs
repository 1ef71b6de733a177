//! `tracing` subscriber setup for binaries and tests that embed rawbuf

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global subscriber.
///
/// `filter` takes precedence; otherwise `verbose` picks the level (0 = info,
/// 1 = debug, 2 = trace for rawbuf, 3+ = trace everywhere). Returns `false`
/// if a subscriber was already installed.
pub fn init_tracing(filter: Option<&str>, verbose: u8, json: bool) -> bool {
    let filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => match verbose {
            0 => EnvFilter::new("rawbuf=info"),
            1 => EnvFilter::new("rawbuf=debug"),
            2 => EnvFilter::new("rawbuf=trace"),
            _ => EnvFilter::new("trace"),
        },
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_tracing(Some("rawbuf=debug"), 0, false);
        assert!(!init_tracing(None, 1, true));
    }
}
