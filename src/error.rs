#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed (status {status:?}): {detail}")]
    Api {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("Unexpected response body: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Profile fetch failed: {0}")]
    Fetch(String),
}

impl Error {
    /// True when the backend rejected the credentials (401 or 403).
    ///
    /// Expired, revoked and malformed tokens all land here; they are not
    /// distinguished further.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Api {
                status: Some(401 | 403),
                ..
            }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
