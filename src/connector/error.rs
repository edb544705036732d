use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context} returned status {status}")]
    UnexpectedStatus {
        context: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("Connector is closed")]
    Closed,
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
