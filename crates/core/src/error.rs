use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Logging was used before a logger backend was installed.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no logger backend installed on this context")]
    MissingLogger,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures the request logger answers on behalf of the downstream handler.
///
/// Responses carry only the canonical status text; details stay in the log.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("handler panicked")]
    Panic,

    #[error("handler timed out")]
    Timeout,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Panic => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let text = status.canonical_reason().unwrap_or("Error");
        (
            status,
            [("content-type", "text/plain; charset=utf-8")],
            format!("{text}\n"),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_response_is_generic() {
        let response = ServerError::Panic.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Internal Server Error\n");
    }

    #[test]
    fn test_timeout_status() {
        assert_eq!(ServerError::Timeout.status_code(), StatusCode::REQUEST_TIMEOUT);
    }
}
