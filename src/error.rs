//! Error handling for the PPE monitor

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame acquisition error (video source)
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Detection model invocation error
    #[error("Detection error: {0}")]
    Detection(String),

    /// Camera registry resolution error
    #[error("Registry error: {0}")]
    Registry(String),

    /// Primary persistence path error (ingest function)
    #[error("Primary persistence error: {0}")]
    PersistencePrimary(String),

    /// Fallback persistence path error (storage upload / record insert)
    #[error("Fallback persistence error: {0}")]
    PersistenceFallback(String),

    /// Voice notification error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Truncate an HTTP response body for error messages and logs
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 150;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(400);
        let s = snippet(&long);
        assert!(s.len() < 200);
        assert!(s.ends_with("..."));
        assert_eq!(snippet("short"), "short");
    }
}
