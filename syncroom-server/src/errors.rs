use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use syncroom_collab::RoomError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Port must be a number, got \"{0}\"")]
    InvalidPort(String),
    #[error("Host must be an IP address, got \"{0}\"")]
    InvalidHost(String),
    #[error("Could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server stopped unexpectedly: {0}")]
    Serve(std::io::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::NotFound(resource) => Self::NotFound(resource),
            e => Self::Unknown(e.to_string()),
        }
    }
}
