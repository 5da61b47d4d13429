//! Settings recognized by the driver shell.
//!
//! Everything not listed here (probe fan-out width, LHM bounds, gossip
//! selection, suspicion window shape) belongs to the engine; the shell
//! only reads the fields below via [`SwimEngine::settings`](crate::SwimEngine::settings).

use crate::member::Node;
use std::time::Duration;

/// Whether the suspicion window escalates suspects to `Unreachable`
/// (an intermediate, still-refutable state) or straight to `Dead`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnreachabilityMode {
    Enabled,
    #[default]
    Disabled,
}

impl UnreachabilityMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, UnreachabilityMode::Enabled)
    }
}

/// Shell-facing configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Peers probed at startup to join the cluster.
    pub initial_contact_points: Vec<Node>,

    /// Escalation mode for timed-out suspects.
    pub unreachability: UnreachabilityMode,

    /// Timeout for each initial-contact probe.
    pub contact_probe_timeout: Duration,

    /// Delay before re-probing an initial contact that failed.
    pub contact_retry_interval: Duration,

    /// Cap on initial-contact probe attempts per node.
    /// `None` retries forever; an unreachable seed is re-probed until it
    /// answers or the shell shuts down.
    pub max_contact_attempts: Option<u32>,

    /// Baseline protocol period, before LHM stretching.
    pub protocol_period: Duration,

    /// Baseline direct-probe timeout, before LHM stretching.
    pub ping_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_contact_points: Vec::new(),
            unreachability: UnreachabilityMode::Disabled,
            contact_probe_timeout: Duration::from_secs(1),
            contact_retry_interval: Duration::from_secs(5),
            max_contact_attempts: None,
            protocol_period: Duration::from_secs(1),
            ping_timeout: Duration::from_millis(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(settings.initial_contact_points.is_empty());
        assert!(!settings.unreachability.is_enabled());
        assert_eq!(settings.contact_probe_timeout, Duration::from_secs(1));
        assert_eq!(settings.contact_retry_interval, Duration::from_secs(5));
        assert!(settings.max_contact_attempts.is_none());
    }
}
