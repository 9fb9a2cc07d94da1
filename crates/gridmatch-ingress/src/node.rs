//! Process plumbing for the `gridmatch-node` binary: configuration
//! loading, logging setup and shutdown signals.

use std::path::Path;

use anyhow::Context;
use gridmatch_types::{GroupId, NodeConfig, ParticipantId};
use tokio::signal;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,gridmatch=debug";

/// Read a TOML config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<NodeConfig> {
    let Some(path) = path else {
        return Ok(NodeConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Parse and validate a TOML config document.
pub fn parse_config(raw: &str) -> anyhow::Result<NodeConfig> {
    let config: NodeConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Parse a `--group` flag: `<id>=<addr>,<addr>,...`.
pub fn parse_group(arg: &str) -> Result<(GroupId, Vec<ParticipantId>), String> {
    let (id, members) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected <group>=<addr>,<addr>..., got {arg}"))?;
    let id: u32 = id
        .trim()
        .parse()
        .map_err(|e| format!("bad group id {id:?}: {e}"))?;
    let members: Vec<ParticipantId> = members
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ParticipantId::new)
        .collect();
    if members.is_empty() {
        return Err(format!("group {id} has no members"));
    }
    Ok((GroupId(id), members))
}

pub fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.settlement.retry.max_attempts, 5);
    }

    #[test]
    fn config_overrides_nested_sections() {
        let config = parse_config(
            r#"
            listen_addr = "127.0.0.1:9000"
            default_market = "CARBON/T"

            [broadcast]
            subscriber_queue = 16

            [settlement]
            buyer_window_start_hour = 18
            attempt_timeout_ms = 5000

            [settlement.retry]
            max_attempts = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.default_market.as_str(), "CARBON/T");
        assert_eq!(config.broadcast.subscriber_queue, 16);
        assert_eq!(config.settlement.buyer_window_start_hour, 18);
        assert_eq!(config.settlement.buyer_window_end_hour, 22);
        assert_eq!(config.settlement.retry.max_attempts, 7);
        assert_eq!(config.settlement.retry.initial_backoff_ms, 1_000);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = parse_config("[broadcast]\nsubscriber_queue = 0\n").unwrap_err();
        assert!(err.to_string().contains("GM_ERR_902"), "Got: {err}");
    }

    #[test]
    fn group_flag() {
        let (group, members) = parse_group("3=0xa, 0xb,").unwrap();
        assert_eq!(group, GroupId(3));
        assert_eq!(members, vec![ParticipantId::new("0xa"), ParticipantId::new("0xb")]);
        assert!(parse_group("3").is_err());
        assert!(parse_group("x=0xa").is_err());
        assert!(parse_group("1=").is_err());
    }
}
