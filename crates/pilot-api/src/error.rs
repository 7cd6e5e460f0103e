use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid data: {0}")]
    Data(String),
}

impl ApiError {
    /// The backend was never reached or the connection broke mid-request.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(_) => {
                "Could not reach the Mail Pilot server. Check your connection and try again."
                    .to_string()
            }
            Self::Unauthorized { message } | Self::Status { message, .. } => message.clone(),
            Self::Url(_) | Self::Data(_) => self.to_string(),
        }
    }
}
