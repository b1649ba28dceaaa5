use serde::Deserialize;

/// Test settings provides a way to send arguments into the Rust tests using environment variables.
pub(super) struct TestSettings {}

impl TestSettings {
    /// How many reads of a cluster the fake management API serves before a submitted change is
    /// reconciled.
    pub(super) fn reconcile_lag() -> u32 {
        TEST_SETTINGS.reconcile_lag
    }
}

#[derive(Debug, Deserialize)]
struct Inner {
    /// # Example
    ///
    /// ```text
    /// HOSTED_SELFTEST_RECONCILE_LAG=5
    /// ```
    #[serde(default = "reconcile_lag")]
    reconcile_lag: u32,
}

lazy_static::lazy_static! {
    static ref TEST_SETTINGS: Inner =
        envy::prefixed("HOSTED_SELFTEST_")
            .from_env::<Inner>()
            .expect("Error parsing TestSettings environment variables");
}

/// We need this to provide a default for serde.
fn reconcile_lag() -> u32 {
    2
}
