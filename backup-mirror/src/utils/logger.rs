//! Logging configuration using tracing.
//!
//! The subscriber is built as an explicit [`Dispatch`] so callers can hand the
//! same instance to the planner, whose workers run on threads that do not
//! inherit a scoped default.

use tracing::Dispatch;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Build a dispatcher filtering at `level` (RUST_LOG takes precedence)
pub fn dispatch(level: &str) -> Dispatch {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    Dispatch::new(subscriber)
}

/// Initialize logging with the specified level and return the installed dispatcher
pub fn init(level: &str) -> anyhow::Result<Dispatch> {
    let dispatch = dispatch(level);
    tracing::dispatcher::set_global_default(dispatch.clone())?;
    Ok(dispatch)
}

/// Level used when `--verbose` is given or not
pub fn level_for(verbose: bool, configured: &str) -> String {
    if verbose {
        "debug".to_string()
    } else {
        configured.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbose() {
        assert_eq!(level_for(true, "warn"), "debug");
        assert_eq!(level_for(false, "warn"), "warn");
    }

    #[test]
    fn test_dispatch_with_invalid_level_falls_back() {
        // Must not panic on garbage input
        let dispatch = dispatch("not-a-level[");
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("logging through fallback filter");
        });
    }
}
