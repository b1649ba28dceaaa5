use crate::clients::{HttpStatusCode, StatusCode};
use snafu::Snafu;

/// The `Result` type returned by `clients`.
pub type Result<T> = std::result::Result<T, Error>;

/// The public error type returned by `clients`.
#[derive(Debug, Snafu)]
pub struct Error(InnerError);

/// The private error type returned by `clients`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub(crate) enum InnerError {
    #[snafu(display("Invalid management API url '{}': {}", url, source))]
    Url {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("Error initializing the HTTP client: {}", source))]
    Initialization { source: reqwest::Error },

    #[snafu(display("Unable to {} {}: {}", method, what, source))]
    Request {
        method: String,
        what: String,
        source: reqwest::Error,
    },

    /// The management API refused the request. `message` is the API's own explanation and is
    /// what callers assert on when an invalid configuration is expected.
    #[snafu(display("The management API rejected the request ({}): {}", status, message))]
    Rejected { status: StatusCode, message: String },

    #[snafu(display("Unable to {} {}: the management API responded {}", method, what, status))]
    Status {
        method: String,
        what: String,
        status: StatusCode,
    },

    #[snafu(display("Unable to find {}", what))]
    NotFound { what: String },

    #[snafu(display("Error serializing object '{}': {}", what, source))]
    Serde {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("The management API returned an unexpected response: {}", what))]
    Response { what: String },
}

impl Error {
    /// An error representing a synchronous rejection by the management API.
    pub fn rejected<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Error(InnerError::Rejected {
            status,
            message: message.into(),
        })
    }

    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Error(InnerError::NotFound { what: what.into() })
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self.0, InnerError::Rejected { .. })
    }

    /// The API's explanation when this error is a rejection.
    pub fn rejection_message(&self) -> Option<&str> {
        match &self.0 {
            InnerError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl HttpStatusCode for InnerError {
    fn status_code(&self) -> Option<StatusCode> {
        match self {
            InnerError::Url { .. }
            | InnerError::Initialization { .. }
            | InnerError::Serde { .. }
            | InnerError::Response { .. } => None,
            InnerError::Request { source, .. } => source.status_code(),
            InnerError::Rejected { status, .. } | InnerError::Status { status, .. } => {
                Some(*status)
            }
            InnerError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
        }
    }
}

impl HttpStatusCode for Error {
    fn status_code(&self) -> Option<StatusCode> {
        self.0.status_code()
    }
}
