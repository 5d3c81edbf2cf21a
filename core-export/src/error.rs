use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid export status: {0}")]
    InvalidStatus(String),

    #[error("Invalid export configuration: {0}")]
    Config(String),

    #[error("No connector registered for platform {0}")]
    UnsupportedPlatform(String),

    #[error("Could not obtain platform credentials: {0}")]
    Credentials(String),

    #[error("No tracks to export")]
    NoTracks,

    #[error("No tracks could be matched on the target platform")]
    NoTracksMatched,

    #[error("Failed to create playlist: {0}")]
    PlaylistCreation(String),

    #[error("Rate limit retries exhausted after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Platform request failed: {0}")]
    Transport(String),

    #[error("Platform returned HTTP {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("Unexpected platform response: {0}")]
    Parse(String),

    #[error("Track source error: {0}")]
    Library(String),

    #[error("Job store error: {0}")]
    JobStore(String),

    #[error("Export cancelled")]
    Cancelled,

    #[error("Unexpected failure: {0}")]
    Internal(String),
}

impl ExportError {
    /// Whether this error must abort the job.
    ///
    /// Transport and platform errors on a single search or add are recorded
    /// as partial failures by the loops that issue them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ExportError::Transport(_) | ExportError::Platform { .. } | ExportError::Parse(_)
        )
    }
}

impl From<BridgeError> for ExportError {
    fn from(error: BridgeError) -> Self {
        ExportError::Transport(error.to_string())
    }
}

impl From<AuthError> for ExportError {
    fn from(error: AuthError) -> Self {
        ExportError::Credentials(error.to_string())
    }
}

impl From<LibraryError> for ExportError {
    fn from(error: LibraryError) -> Self {
        ExportError::Library(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
