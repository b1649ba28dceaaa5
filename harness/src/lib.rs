/*!

`hosted-harness` drives hosted Kubernetes clusters through a Rancher-style management API and
checks that what the control plane observes on the provider converges with what was asked for.

A scenario submits a change with the [`mutator`], waits for it with the [`wait`] poller, and can
confirm it on the provider with the CLIs in [`provider`]. The [`operations`] module bundles the
common change-and-wait sequences, and the [`scenario`] runner executes the registered
[`scenarios`] and reports their outcome.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub mod config;
mod context;
pub mod downstream;
mod env_guard;
mod error;
pub mod mutator;
pub mod operations;
pub mod provider;
pub mod scenario;
pub mod scenarios;
pub mod settings;
mod versions;
pub mod wait;

pub use config::HarnessConfig;
pub use context::{random_name, Harness, ScenarioContext};
pub use env_guard::EnvVarGuard;
pub use error::{Error, Result};
pub use settings::Settings;
pub use versions::k8s_version_for;

use env_logger::Builder;
use log::LevelFilter;

/// The level used for this workspace's crates when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// Logs this workspace's crates and `bin_crate` at `log_level`, and everything else at `Error`.
/// If the `RUST_LOG` environment variable is present it is used instead.
pub fn init_logger(bin_crate: &str, log_level: Option<LevelFilter>) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            let log_level = log_level.unwrap_or(DEFAULT_LEVEL_FILTER);
            Builder::new()
                .filter_level(LevelFilter::Error)
                .filter(Some(bin_crate), log_level)
                .filter(Some("hosted_harness"), log_level)
                .filter(Some("hosted_model"), log_level)
                .init();
        }
    }
}
