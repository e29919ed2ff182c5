use crate::db::StoreError;
use crate::places::LookupError;
use crate::remote::RemoteError;
use thiserror::Error;

/// Failures of an HTTP-backed transport (remote store or places service).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Unauthorized - credentials missing or expired")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl TransportError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => TransportError::Unauthorized,
            403 => TransportError::PermissionDenied(truncated),
            404 => TransportError::NotFound(truncated),
            429 => TransportError::RateLimited,
            500..=599 => TransportError::Server(truncated),
            _ => TransportError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

/// Terminal failure of a workflow, as seen by callers of the repository.
///
/// Carries rendered messages so the same value can be fanned out to result
/// channel subscribers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("remote store timed out: {0}")]
    RemoteTimeout(String),

    #[error("remote store failure: {0}")]
    RemoteFailure(String),

    #[error("local store failure: {0}")]
    LocalFailure(String),

    #[error("no place found for '{0}'")]
    LookupNotFound(String),

    #[error("place lookup failure: {0}")]
    LookupFailure(String),
}

impl SyncError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteTimeout(_) | SyncError::RemoteFailure(_)
        )
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Timeout(_) => SyncError::RemoteTimeout(err.to_string()),
            other => SyncError::RemoteFailure(other.to_string()),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::LocalFailure(err.to_string())
    }
}

impl From<LookupError> for SyncError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(query) => SyncError::LookupNotFound(query),
            LookupError::Transport(inner) => SyncError::LookupFailure(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_codes_map_to_variants() {
        assert!(matches!(
            TransportError::from_status(StatusCode::UNAUTHORIZED, ""),
            TransportError::Unauthorized
        ));
        assert!(matches!(
            TransportError::from_status(StatusCode::FORBIDDEN, "rules"),
            TransportError::PermissionDenied(body) if body == "rules"
        ));
        assert!(matches!(
            TransportError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            TransportError::RateLimited
        ));
        assert!(matches!(
            TransportError::from_status(StatusCode::BAD_GATEWAY, "down"),
            TransportError::Server(_)
        ));
        assert!(matches!(
            TransportError::from_status(StatusCode::IM_A_TEAPOT, ""),
            TransportError::InvalidResponse(_)
        ));
    }

    #[test]
    fn component_errors_map_into_taxonomy() {
        let timeout = SyncError::from(RemoteError::Timeout(std::time::Duration::from_secs(20)));
        assert!(matches!(timeout, SyncError::RemoteTimeout(_)));
        assert!(timeout.is_remote());

        let offline = SyncError::from(RemoteError::Transport(TransportError::Unavailable(
            "offline".into(),
        )));
        assert!(matches!(offline, SyncError::RemoteFailure(msg) if msg.contains("offline")));

        assert_eq!(
            SyncError::from(StoreError::MissingKey),
            SyncError::LocalFailure("work place has no key".into())
        );
        assert_eq!(
            SyncError::from(LookupError::NotFound("cafe".into())),
            SyncError::LookupNotFound("cafe".into())
        );
        assert!(matches!(
            SyncError::from(LookupError::Transport(TransportError::RateLimited)),
            SyncError::LookupFailure(_)
        ));
        assert!(!SyncError::LookupFailure("x".into()).is_remote());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        match TransportError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            TransportError::Server(msg) => {
                assert!(msg.len() < 600);
                assert!(msg.contains("2000 total bytes"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
