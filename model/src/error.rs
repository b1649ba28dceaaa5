use snafu::Snafu;
use std::time::Duration;

#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Unable to parse '{}' as a k8s version: {}", value, reason))]
    VersionParse { value: String, reason: String },

    #[snafu(display(
        "Invalid convergence window: interval {:?} must be non-zero and no longer than timeout {:?}",
        interval,
        timeout
    ))]
    InvalidWindow {
        timeout: Duration,
        interval: Duration,
    },

    #[snafu(display("Unknown provider '{}', expected one of 'eks' or 'gke'", value))]
    UnknownProvider { value: String },
}
