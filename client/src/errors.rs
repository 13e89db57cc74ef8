use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No response was obtained: connection refused, DNS failure, timeout.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Http {
        status: u16,
        message: Option<String>,
    },

    #[error("Response decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_timeout())
    }

    /// True when no response was obtained at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = Error::Http {
            status: 429,
            message: Some("Too many requests".to_string()),
        };
        assert_eq!(err.to_string(), "HTTP 429: Too many requests");
        assert!(err.is_rate_limited());
        assert!(!err.is_unauthorized());

        let bare = Error::Http {
            status: 502,
            message: None,
        };
        assert_eq!(bare.to_string(), "HTTP 502");
        assert!(bare.is_server_error());
    }

    #[test]
    fn test_status_classification() {
        let unauthorized = Error::Http {
            status: 401,
            message: None,
        };
        assert!(unauthorized.is_unauthorized());
        assert_eq!(unauthorized.status(), Some(401));

        let config = Error::Config("bad url".to_string());
        assert_eq!(config.status(), None);
        assert!(!config.is_transport());
    }
}
