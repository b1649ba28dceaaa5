use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::time::Duration;

const MINUTE: u64 = 60;

/// How long and how often the convergence poller samples observed state before declaring failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceWindow {
    timeout: Duration,
    interval: Duration,
}

impl ConvergenceWindow {
    /// Control plane version upgrades.
    pub const CONTROL_PLANE_UPGRADE: Self = Self::fixed(15 * MINUTE, 30);
    /// Adding, removing, scaling or upgrading node groups.
    pub const NODE_GROUP: Self = Self::fixed(15 * MINUTE, 10);
    /// Tags, labels, logging types and network access.
    pub const METADATA: Self = Self::fixed(10 * MINUTE, 15);
    /// Changes made directly on the provider that must be synced back by the control plane.
    pub const PROVIDER_SYNC: Self = Self::fixed(5 * MINUTE, 10);
    /// Waiting for an invalid configuration to surface as a provisioning error.
    pub const PROVISIONING_ERROR: Self = Self::fixed(10 * MINUTE, 30);
    /// Waiting for the operator to flag a rejected configuration.
    pub const VALIDATION_ERROR: Self = Self::fixed(MINUTE, 3);
    /// Waiting for the provider to refuse an invalid endpoint setting.
    pub const INVALID_ENDPOINT: Self = Self::fixed(2 * MINUTE, 3);
    /// Waiting for a new cluster to become active.
    pub const CLUSTER_READY: Self = Self::fixed(30 * MINUTE, 30);

    const fn fixed(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        ensure!(
            !interval.is_zero() && interval <= timeout,
            error::InvalidWindowSnafu { timeout, interval }
        );
        Ok(Self { timeout, interval })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Multiplies the timeout by `factor`, leaving the interval unchanged. Slow environments use
    /// this to stretch every window at once. Factors below 1.0 are ignored.
    pub fn scaled(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 1.0 {
            return self;
        }
        Self {
            timeout: self.timeout.mul_f64(factor),
            interval: self.interval,
        }
    }

    /// The largest number of samples a poller using this window may take: one at the start, and
    /// one per interval until the deadline, where the last sleep is clamped to the deadline.
    pub fn max_samples(&self) -> u64 {
        let timeout = self.timeout.as_nanos();
        let interval = self.interval.as_nanos().max(1);
        let ceil = (timeout + interval - 1) / interval;
        u64::try_from(ceil).unwrap_or(u64::MAX).saturating_add(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_interval_longer_than_timeout() {
        assert!(ConvergenceWindow::new(Duration::from_secs(1), Duration::from_secs(2)).is_err());
        assert!(ConvergenceWindow::new(Duration::from_secs(1), Duration::ZERO).is_err());
        assert!(ConvergenceWindow::new(Duration::from_secs(2), Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn max_samples_rounds_up() {
        let window =
            ConvergenceWindow::new(Duration::from_millis(100), Duration::from_millis(30)).unwrap();
        assert_eq!(window.max_samples(), 5);
        assert_eq!(ConvergenceWindow::NODE_GROUP.max_samples(), 91);
    }

    #[test]
    fn scaling_only_stretches_timeout() {
        let scaled = ConvergenceWindow::METADATA.scaled(2.0);
        assert_eq!(scaled.timeout(), Duration::from_secs(20 * MINUTE));
        assert_eq!(scaled.interval(), Duration::from_secs(15));
        assert_eq!(ConvergenceWindow::METADATA.scaled(0.5), ConvergenceWindow::METADATA);
    }
}
