//! Error types for the update orchestrator.
//!
//! Each component has its own error enum; [`UpdateError`] is the umbrella
//! type returned at the [`Updater`](crate::update::Updater) boundary.

/// Errors from asking a release source for the latest release.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The release source has no published releases.
    #[error("no releases published")]
    NoReleases,

    /// The release service answered with an unexpected HTTP status.
    #[error("release service returned HTTP {0}")]
    ServiceError(u16),

    /// The request did not complete in time and was aborted.
    #[error("release check timed out after {secs}s")]
    Timeout {
        /// The timeout that elapsed, in seconds.
        secs: u64,
    },

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be understood.
    #[error("invalid release metadata: {0}")]
    InvalidResponse(String),
}

/// Errors from fetching an artifact to disk.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The terminal response was not `200 OK`.
    #[error("download failed with HTTP {0}")]
    HttpStatus(u16),

    /// Writing the artifact or reading the body stream failed.
    #[error("download I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure while requesting or streaming.
    #[error("download network error: {0}")]
    Network(String),

    /// The redirect chain exceeded the hop limit.
    #[error("too many redirects (gave up after {hops} hops)")]
    RedirectLoop {
        /// Number of redirects followed before giving up.
        hops: usize,
    },

    /// A redirect response carried no usable `Location` header.
    #[error("redirect response without a Location header")]
    MissingLocation,

    /// The body ended before the announced `Content-Length`.
    #[error("download truncated: expected {expected} bytes, received {received}")]
    Truncated {
        /// Bytes announced by the server.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// The artifact URL could not be parsed or resolved.
    #[error("invalid download URL: {0}")]
    InvalidUrl(String),

    /// The download was cancelled by the caller.
    #[error("download cancelled")]
    Cancelled,
}

/// Errors from handing a downloaded artifact to the platform.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Updates cannot be downloaded or installed in development mode.
    #[error("updates are unavailable in development mode")]
    NotAvailableInMode,

    /// The platform install or relaunch mechanism failed.
    #[error("platform install handler failed: {0}")]
    PlatformHandlerFailed(String),

    /// There is no downloaded artifact to install.
    #[error("no downloaded update to install")]
    NothingToInstall,
}

/// Top-level error type for update operations.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Release check failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Artifact download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Install or relaunch failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Another check, download or install is already in flight.
    #[error("update operation already in progress ({phase})")]
    Busy {
        /// Phase the updater was in when the request arrived.
        phase: crate::update::UpdatePhase,
    },

    /// The requested action is not valid from the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        /// The rejected action.
        action: crate::update::Action,
        /// Phase the updater was in when the request arrived.
        phase: crate::update::UpdatePhase,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Settings store read/write error.
    #[error("settings error: {0}")]
    Settings(String),

    /// I/O error outside a download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Render the `source()` chain below this error, one cause per line.
    ///
    /// Returns `None` when the error has no underlying cause.
    pub fn cause_chain(&self) -> Option<String> {
        let mut causes: Vec<String> = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        if causes.is_empty() {
            None
        } else {
            Some(causes.join("\n"))
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;
