//! Logging setup
//!
//! `RUST_LOG` (or `--log-level`) selects the filter; a bare level such as
//! `debug` also quiets the transport crates. `LOG_FORMAT=json` switches to
//! one JSON object per line for log shippers.
//!
//! Created: 2026-02-03

use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Noisy dependency modules capped at info when a bare level is given
const QUIET_MODULES: &str = "hyper=info,hyper_util=info,reqwest=info,alloy_transport_http=info,alloy_rpc_client=info";

/// Expand a bare level into a filter spec; custom directives pass through.
pub fn filter_spec(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains(',') || level.contains('=') {
        level.to_string()
    } else {
        format!("{},{}", level, QUIET_MODULES)
    }
}

pub fn setup_logging(log_level: &str, json_format: bool) {
    let spec = filter_spec(log_level);
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false).compact()).init();
    }

    tracing::info!(
        "Logging initialized (filter: {}, format: {})",
        spec,
        if json_format { "json" } else { "compact" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_spec() {
        assert!(filter_spec("debug").starts_with("debug,hyper=info"));
        assert_eq!(filter_spec("auction_operator=trace,info"), "auction_operator=trace,info");
        assert_eq!(filter_spec(" warn=debug "), "warn=debug");
    }
}
