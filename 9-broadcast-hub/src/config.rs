use std::time::Duration;

use crate::cli::ServeArgs;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;
pub const DEFAULT_EVICTION_THRESHOLD: u32 = 16;
pub const DEFAULT_INTAKE_CAPACITY: usize = 1024;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Limits applied by the hub and by each connection it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Outbound lines a session may have queued before deliveries to it fail.
    pub mailbox_capacity: usize,
    /// Consecutive failed deliveries tolerated before a session is evicted.
    pub eviction_threshold: u32,
    /// Events buffered between readers and the hub loop.
    pub intake_capacity: usize,
    /// Upper bound on registered sessions, `None` for unbounded.
    pub max_sessions: Option<usize>,
    /// How long a reader waits for a line before ending the session.
    pub idle_timeout: Option<Duration>,
    /// Longest a single line write to a client may take before its
    /// connection is dropped.
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            max_sessions: None,
            idle_timeout: None,
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
        }
    }
}

impl From<&ServeArgs> for HubConfig {
    fn from(args: &ServeArgs) -> Self {
        Self {
            mailbox_capacity: args.mailbox_capacity,
            eviction_threshold: args.eviction_threshold,
            intake_capacity: args.intake_capacity,
            max_sessions: args.max_sessions,
            idle_timeout: args.idle_timeout_secs.map(Duration::from_secs),
            write_timeout: Duration::from_secs(args.write_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn serve_args(argv: &[&str]) -> ServeArgs {
        match Cli::parse_from(argv).command {
            Command::Serve(args) => args,
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn flags_default_to_library_defaults() {
        let config = HubConfig::from(&serve_args(&["broadcast_hub", "serve"]));
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn optional_limits_are_explicit() {
        let args = serve_args(&[
            "broadcast_hub",
            "serve",
            "--max-sessions",
            "3",
            "--idle-timeout-secs",
            "30",
            "--mailbox-capacity",
            "8",
            "--write-timeout-secs",
            "2",
        ]);
        let config = HubConfig::from(&args);

        assert_eq!(config.max_sessions, Some(3));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.write_timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_mailbox_capacity_is_rejected() {
        let result = Cli::try_parse_from(["broadcast_hub", "serve", "--mailbox-capacity", "0"]);
        assert!(result.is_err());
    }
}
