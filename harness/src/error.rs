use hosted_model::ConvergenceWindow;
use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("The management API rejected the {}: {}", what, message))]
    Rejected { what: String, message: String },

    #[snafu(display(
        "Timed out after {:?} waiting for {} (timeout {:?}, interval {:?}): expected {}, last observed {}",
        elapsed,
        awaited,
        window.timeout(),
        window.interval(),
        expected,
        last_observed
    ))]
    ConvergenceTimeout {
        awaited: String,
        expected: String,
        last_observed: String,
        elapsed: Duration,
        window: ConvergenceWindow,
    },

    #[snafu(display(
        "Error running '{} {}', exit code {}\nstderr:\n{}\nstdout:\n{}",
        program,
        args,
        code,
        stderr,
        stdout
    ))]
    Subprocess {
        program: String,
        args: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[snafu(display("Unable to start '{}': {}", program, source))]
    Process {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("Unexpected {}: expected {}, found {}", what, expected, actual))]
    UnexpectedConfig {
        what: String,
        expected: String,
        actual: String,
    },

    #[snafu(display("Unable to {}: {}", what, source))]
    Client {
        what: String,
        source: hosted_model::clients::Error,
    },

    #[snafu(display("Unable to evaluate query '{}': {}", expression, reason))]
    Query { expression: String, reason: String },

    #[snafu(display("Unable to read config file '{}': {}", path.display(), source))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse config file '{}': {}", path.display(), source))]
    Config {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Missing configuration: {}", what))]
    MissingConfig { what: String },

    #[snafu(display("Unable to read settings from the environment: {}", source))]
    Settings { source: envy::Error },

    #[snafu(display("Unable to {}: {}", what, source))]
    Kube { what: String, source: kube::Error },

    #[snafu(display("Unable to load kubeconfig for {}: {}", what, source))]
    Kubeconfig {
        what: String,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to {}: {}", what, source))]
    Io {
        what: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to write report to '{}': {}", path.display(), source))]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to serialize {}: {}", what, source))]
    Serde {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("The scenario has no cluster to {}", action))]
    NoCluster { action: String },

    #[snafu(display("{}", source))]
    Model { source: hosted_model::Error },
}

impl Error {
    /// Wraps a management API error, keeping synchronous rejections distinguishable from every
    /// other failure.
    pub fn from_client<S: Into<String>>(what: S, source: hosted_model::clients::Error) -> Self {
        let what = what.into();
        match source.rejection_message() {
            Some(message) => Error::Rejected {
                what,
                message: message.to_string(),
            },
            None => Error::Client { what, source },
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }

    pub fn is_convergence_timeout(&self) -> bool {
        matches!(self, Error::ConvergenceTimeout { .. })
    }
}
