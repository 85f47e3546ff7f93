// file: src/logging/logger.rs
// version: 2.0.0
// guid: 0a1b2c3d-4e5f-4678-9012-3456789abcde

//! Logger initialization and configuration

use crate::{RegistrarError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the console logger
fn level_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Initialize the console logging system
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(level_directive(verbose, quiet)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| RegistrarError::config(format!("Failed to initialize logger: {}", e)))?;

    Ok(())
}

/// Initialize structured JSON logging for the service, honouring `RUST_LOG`
pub fn init_json_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true).with_span_list(false))
        .try_init()
        .map_err(|e| RegistrarError::config(format!("Failed to initialize JSON logger: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive(false, false), "info");
        assert_eq!(level_directive(true, false), "debug");
        assert_eq!(level_directive(false, true), "error");
        // quiet wins
        assert_eq!(level_directive(true, true), "error");
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        // A subscriber may already be installed by another test
        let _ = init_logger(false, false);
        assert!(init_json_logger().is_err());
    }
}
