/// Convenience result type used across the crate.
pub type AnimatorResult<T> = Result<T, AnimatorError>;

/// Top-level error type for the animation pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AnimatorError {
    /// Invalid user input or configuration (missing pick, bad ranges, bad config values).
    #[error("validation error: {0}")]
    Validation(String),

    /// A tile request that failed after retries.
    #[error("fetch error: {url}: {message}")]
    Fetch {
        /// The request URL, including its `TIME` parameter.
        url: String,
        /// HTTP status when the server answered; `None` for network errors and timeouts.
        status: Option<u16>,
        message: String,
    },

    /// Decoding or drawing a frame failed.
    #[error("compose error: {0}")]
    Compose(String),

    /// A video sink or the assembly procedure failed.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// A layer identifier that belongs to no known group.
    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    /// The run was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other error, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnimatorError {
    /// Build an [`AnimatorError::Validation`] from any message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            status: None,
            message: msg.into(),
        }
    }

    /// A fetch failure caused by a non-success HTTP status.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            url: url.into(),
            status: Some(status),
            message: format!("unexpected HTTP status {status}"),
        }
    }

    pub fn compose(msg: impl Into<String>) -> Self {
        Self::Compose(msg.into())
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    pub fn unknown_layer(id: impl Into<String>) -> Self {
        Self::UnknownLayer(id.into())
    }

    /// HTTP status carried by a fetch failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }

    /// Network failures and 5xx answers are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { status: None, .. } => true,
            Self::Fetch {
                status: Some(code), ..
            } => *code >= 500,
            _ => false,
        }
    }
}
