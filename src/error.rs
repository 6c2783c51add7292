use chrono::NaiveDate;
use http::StatusCode;
use serde_json::Value;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Everything a session call may fail with.
///
/// The API failures (`InvalidToken` to `Server`) form a closed set: a well-formed HTTP exchange
/// always resolves to one of them or to a success. Session misuse and transport failures are
/// reported separately, because they are caller bugs and environment problems respectively.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token failed local validation, no request has been sent.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The server rejected the token (HTTP 401).
    #[error("authentication failed: {message}")]
    Authentication { message: String, body: Option<String> },

    /// The token is valid, but it does not grant access to the PRM (HTTP 403).
    #[error("token does not grant access to PRM `{prm}`")]
    PrmAccess { prm: String, message: String, body: Option<String> },

    /// The server refused the request parameters (HTTP 400 or 422).
    #[error("bad request ({status}): {message}")]
    BadRequest { status: StatusCode, message: String, body: Option<String> },

    /// Any other status, or a successful response which could not be interpreted.
    #[error("server error ({status}): {message}")]
    Server { status: StatusCode, message: String, body: Option<String> },

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Classify a non-successful response.
    ///
    /// `prm` is the PRM the request has been issued for, if any. It is used to attribute
    /// a 403 when the body does not name the PRM itself.
    ///
    /// Returns [`None`] for successful (2xx) statuses.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &[u8], prm: Option<&str>) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        let text = String::from_utf8_lossy(body).trim().to_owned();
        let json = serde_json::from_slice::<Value>(body).ok();
        let field = |name: &str| {
            json.as_ref()
                .and_then(|json| json.get(name))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        };
        let message = field("error")
            .or_else(|| field("message"))
            .or_else(|| (!text.is_empty()).then(|| text.clone()));
        let body = (!text.is_empty()).then_some(text);

        let error = match status.as_u16() {
            400 | 422 => Self::BadRequest {
                status,
                message: message.unwrap_or_else(|| "bad request".to_owned()),
                body,
            },
            401 => Self::Authentication {
                message: message.unwrap_or_else(|| "authentication failed".to_owned()),
                body,
            },
            403 => {
                let message = message.unwrap_or_else(|| "access denied".to_owned());
                match field("prm").or_else(|| field("usage_point_id")).or_else(|| prm.map(ToOwned::to_owned)) {
                    Some(prm) => Self::PrmAccess { prm, message, body },
                    // Nothing to attribute the refusal to, e.g. the PRM listing itself.
                    None => Self::Authentication { message, body },
                }
            }
            _ => Self::Server {
                status,
                message: message.unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("server error").to_owned()
                }),
                body,
            },
        };
        Some(error)
    }

    /// Wrap a successful response whose body could not be interpreted.
    pub(crate) fn unexpected_response(
        status: StatusCode,
        error: impl std::fmt::Display,
        body: &[u8],
    ) -> Self {
        Self::Server {
            status,
            message: format!("unexpected response: {error}"),
            body: Some(String::from_utf8_lossy(body).into_owned()),
        }
    }

    /// Whether repeating the same call later may succeed.
    ///
    /// The client never retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Transport(_))
    }

    /// HTTP status the server responded with, for the API failures.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Authentication { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::PrmAccess { .. } => Some(StatusCode::FORBIDDEN),
            Self::BadRequest { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::InvalidToken(_) | Self::Usage(_) | Self::Transport(_) => None,
        }
    }
}

/// Session misuse. These are bugs in the calling code and are never worth retrying.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum UsageError {
    #[error("the session has not been opened")]
    NotOpen,

    #[error("the session has been closed")]
    Closed,

    #[error("the token grants access to several PRMs ({}), select one explicitly", prms.join(", "))]
    AmbiguousPrm { prms: Vec<String> },

    #[error("the token does not grant access to any PRM")]
    NoPrm,

    #[error("`{start}` must be strictly before `{end}`")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("cannot build the request: {0}")]
    InvalidRequest(String),
}

/// The request did not complete an HTTP exchange: DNS, connection, TLS, timeout and the like.
#[derive(Debug, thiserror::Error)]
#[error("transport failure: {0}")]
pub struct TransportError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

impl From<ureq::Error> for TransportError {
    fn from(error: ureq::Error) -> Self {
        Self::new(error)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self::new(error)
    }
}

impl From<http::Error> for TransportError {
    fn from(error: http::Error) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRM: Option<&str> = Some("12345678901234");

    #[test]
    fn success_is_not_an_error() {
        assert!(Error::from_response(StatusCode::OK, b"{}", PRM).is_none());
        assert!(Error::from_response(StatusCode::NO_CONTENT, b"", PRM).is_none());
    }

    #[test]
    fn unauthorized_ok() {
        match Error::from_response(StatusCode::UNAUTHORIZED, br#"{"error":"Invalid token"}"#, PRM) {
            Some(Error::Authentication { message, body }) => {
                assert_eq!(message, "Invalid token");
                assert_eq!(body.as_deref(), Some(r#"{"error":"Invalid token"}"#));
            }
            other => panic!("expected an authentication error, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_with_prm_in_body_ok() {
        let body = br#"{"error":"Forbidden","prm":"X"}"#;
        match Error::from_response(StatusCode::FORBIDDEN, body, PRM) {
            Some(Error::PrmAccess { prm, message, .. }) => {
                assert_eq!(prm, "X");
                assert_eq!(message, "Forbidden");
            }
            other => panic!("expected a PRM access error, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_falls_back_to_requested_prm() {
        match Error::from_response(StatusCode::FORBIDDEN, b"", PRM) {
            Some(Error::PrmAccess { prm, message, body }) => {
                assert_eq!(prm, "12345678901234");
                assert_eq!(message, "access denied");
                assert!(body.is_none());
            }
            other => panic!("expected a PRM access error, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_without_any_prm_is_authentication() {
        let error = Error::from_response(StatusCode::FORBIDDEN, b"nope", None);
        assert!(matches!(error, Some(Error::Authentication { message, .. }) if message == "nope"));
    }

    #[test]
    fn bad_request_ok() {
        let body = br#"{"message":"invalid date range"}"#;
        match Error::from_response(StatusCode::BAD_REQUEST, body, PRM) {
            Some(Error::BadRequest { status, message, .. }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "invalid date range");
            }
            other => panic!("expected a bad request error, got {other:?}"),
        }
    }

    #[test]
    fn unprocessable_entity_is_bad_request() {
        match Error::from_response(StatusCode::UNPROCESSABLE_ENTITY, b"invalid date range", PRM) {
            Some(Error::BadRequest { status, message, .. }) => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(message, "invalid date range");
            }
            other => panic!("expected a bad request error, got {other:?}"),
        }
    }

    #[test]
    fn service_unavailable_is_server_error() {
        let error = Error::from_response(StatusCode::SERVICE_UNAVAILABLE, b"", PRM).unwrap();
        assert!(matches!(error, Error::Server { ref message, .. } if message == "Service Unavailable"));
        assert!(error.is_retryable());
        assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn unknown_status_is_server_error() {
        for status in [StatusCode::NOT_FOUND, StatusCode::TOO_MANY_REQUESTS, StatusCode::MOVED_PERMANENTLY] {
            let error = Error::from_response(status, b"<html></html>", PRM);
            assert!(
                matches!(error, Some(Error::Server { status: actual, .. }) if actual == status),
                "{status} must be a server error",
            );
        }
    }

    #[test]
    fn non_string_error_field_is_ignored() {
        let error = Error::from_response(
            StatusCode::BAD_REQUEST,
            br#"{"error":{"code":1},"message":"start is after end"}"#,
            PRM,
        );
        assert!(matches!(error, Some(Error::BadRequest { message, .. }) if message == "start is after end"));
    }

    #[test]
    fn retryable_ok() {
        assert!(!Error::InvalidToken("bad".to_owned()).is_retryable());
        assert!(!Error::Usage(UsageError::NoPrm).is_retryable());
        assert!(Error::Transport(TransportError::new("connection refused")).is_retryable());
    }
}
