#![forbid(unsafe_code)]

use thiserror::Error;

/// Duplicate-action conflicts the backend reports for requests that already took effect.
const BENIGN_MARKERS: [&str; 3] = ["already started", "task already taken", "already liked"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    Network,
    Timeout,
    Status(u16),
    Decode,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Status(code), message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    pub fn is_benign(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        BENIGN_MARKERS.iter().any(|marker| message.contains(marker))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            ApiErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

/// Failures of session setup paths (sign-in, restore, catalog loads, marker writes).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] rh_storage::StoreError),
    #[error("invalid account id: {0}")]
    InvalidId(#[from] rh_core::ids::IdError),
    #[error(transparent)]
    Invalid(#[from] rh_core::validate::ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_matching_is_case_insensitive() {
        assert!(ApiError::status(400, "Task Already Taken").is_benign());
        assert!(ApiError::status(409, "you have ALREADY STARTED this task").is_benign());
        assert!(ApiError::status(400, "already liked").is_benign());
        assert!(!ApiError::status(400, "Insufficient balance").is_benign());
        assert!(!ApiError::network("connection refused").is_benign());
    }

    #[test]
    fn status_code_only_for_status_errors() {
        assert_eq!(ApiError::status(503, "down").status_code(), Some(503));
        assert_eq!(ApiError::timeout("slow").status_code(), None);
        assert_eq!(ApiError::decode("bad json").to_string(), "bad json");
    }
}
