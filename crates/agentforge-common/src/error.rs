/// Error taxonomy shared by every agentforge crate.
///
/// The gateway maps each variant onto an HTTP status; the string payloads
/// are the user-facing detail text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// A required credential or setting is missing from process configuration.
    #[error("{0}")]
    Configuration(String),

    /// The provider answered with a non-2xx status.
    #[error("{detail}")]
    Upstream { status: u16, detail: String },

    /// The provider could not be reached (connect, timeout, broken body).
    #[error("HTTP Request error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Agent(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code this error should surface as.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Upstream { status, .. } => *status,
            Error::Configuration(_)
            | Error::Transport(_)
            | Error::Database(_)
            | Error::Agent(_)
            | Error::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Configuration("x".into()).status_code(), 500);
        assert_eq!(Error::Transport("x".into()).status_code(), 500);
        assert_eq!(
            Error::Upstream {
                status: 429,
                detail: "slow down".into()
            }
            .status_code(),
            429
        );
    }

    #[test]
    fn upstream_display_is_the_detail() {
        let err = Error::Upstream {
            status: 404,
            detail: "The model x appears to be unavailable.".into(),
        };
        assert_eq!(err.to_string(), "The model x appears to be unavailable.");
    }
}
