use thiserror::Error;

/// Type alias for Result with ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

/// Seconds to wait when the service rejects a call for quota without saying how long
const DEFAULT_RETRY_AFTER: u64 = 5;

/// Error types for the address export pipeline
#[derive(Error, Debug)]
pub enum ExportError {
    /// Credential acquisition or refresh failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The service rejected the call for exceeding its quota
    #[error("Quota exceeded, retry after {retry_after} seconds")]
    QuotaExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other unexpected status from the Gmail API
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Message disappeared between search and fetch (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403) for reasons other than quota
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Response was missing fields we rely on
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// A single address fragment could not be parsed
    #[error("Unparseable address: {0}")]
    AddressParse(String),

    /// Cancellation flag was observed between calls
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV output error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl ExportError {
    /// True when the remote service reported quota exhaustion
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ExportError::QuotaExceeded { .. })
    }

    /// Check if the error is transient (a later re-run may succeed)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExportError::QuotaExceeded { .. }
                | ExportError::ServerError { .. }
                | ExportError::TransportError(_)
        )
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The header can be given as delay-seconds ("120") or as an HTTP date.
/// Missing, invalid or past values fall back to a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

/// Reasons Google uses in error bodies for quota rejections
const QUOTA_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded", "quotaExceeded"];

/// Map a Google JSON error body (`{"error": {"code": .., "errors": [..]}}`) to an error
fn classify_error_body(body: &serde_json::Value) -> ExportError {
    let error = &body["error"];
    let code = error["code"].as_u64().unwrap_or(0) as u16;
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    let quota_reason = error["errors"]
        .as_array()
        .map(|errors| {
            errors.iter().any(|e| {
                e["reason"]
                    .as_str()
                    .map(|r| QUOTA_REASONS.contains(&r))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);
    let exhausted = error["status"].as_str() == Some("RESOURCE_EXHAUSTED");

    if code == 429 || (code == 403 && quota_reason) || exhausted {
        return ExportError::QuotaExceeded {
            retry_after: DEFAULT_RETRY_AFTER,
        };
    }

    classify_status(code, message)
}

fn classify_status(status_code: u16, message: String) -> ExportError {
    match status_code {
        401 => ExportError::AuthError(message),
        403 => ExportError::Forbidden(message),
        404 => ExportError::MessageNotFound(message),
        400 => ExportError::BadRequest(message),
        500..=599 => ExportError::ServerError {
            status: status_code,
            message,
        },
        _ => ExportError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for ExportError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // Non-success response whose body was not JSON
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                if status_code == 429 {
                    return ExportError::QuotaExceeded {
                        retry_after: parse_retry_after_header(response),
                    };
                }
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );
                classify_status(status_code, message)
            }
            // Non-success response carrying a Google JSON error body
            google_gmail1::Error::BadRequest(ref body) => classify_error_body(body),
            google_gmail1::Error::MissingToken(err) => {
                ExportError::AuthError(format!("No valid token: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                ExportError::TransportError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => ExportError::TransportError(err.to_string()),
            google_gmail1::Error::JsonDecodeError(_, err) => {
                ExportError::InvalidMessageFormat(format!("Undecodable response: {}", err))
            }
            other => ExportError::ApiError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transient_errors() {
        let quota = ExportError::QuotaExceeded { retry_after: 5 };
        assert!(quota.is_transient());
        assert!(quota.is_quota_exceeded());

        let server_error = ExportError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(server_error.is_transient());
        assert!(!server_error.is_quota_exceeded());

        let transport = ExportError::TransportError("Connection timeout".to_string());
        assert!(transport.is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!ExportError::AuthError("expired".to_string()).is_transient());
        assert!(!ExportError::MessageNotFound("msg123".to_string()).is_transient());
        assert!(!ExportError::Forbidden("Access denied".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let display = format!("{}", ExportError::QuotaExceeded { retry_after: 10 });
        assert!(display.contains("Quota exceeded"));
        assert!(display.contains("10 seconds"));

        let display = format!("{}", ExportError::AuthError("Invalid token".to_string()));
        assert!(display.contains("Authentication failed"));
    }

    #[test]
    fn test_classify_rate_limit_body() {
        let body = json!({
            "error": {
                "code": 429,
                "message": "Too many requests",
                "errors": [{"reason": "rateLimitExceeded"}]
            }
        });
        assert!(classify_error_body(&body).is_quota_exceeded());
    }

    #[test]
    fn test_classify_user_rate_limit_403_body() {
        let body = json!({
            "error": {
                "code": 403,
                "message": "User-rate limit exceeded",
                "errors": [{"reason": "userRateLimitExceeded", "domain": "usageLimits"}]
            }
        });
        assert!(classify_error_body(&body).is_quota_exceeded());
    }

    #[test]
    fn test_classify_resource_exhausted_status() {
        let body = json!({"error": {"code": 400, "status": "RESOURCE_EXHAUSTED"}});
        assert!(classify_error_body(&body).is_quota_exceeded());
    }

    #[test]
    fn test_classify_plain_forbidden_body() {
        let body = json!({
            "error": {
                "code": 403,
                "message": "Insufficient permission",
                "errors": [{"reason": "insufficientPermissions"}]
            }
        });
        match classify_error_body(&body) {
            ExportError::Forbidden(msg) => assert_eq!(msg, "Insufficient permission"),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_status_codes() {
        assert!(matches!(
            classify_status(401, "x".to_string()),
            ExportError::AuthError(_)
        ));
        assert!(matches!(
            classify_status(404, "x".to_string()),
            ExportError::MessageNotFound(_)
        ));
        assert!(matches!(
            classify_status(502, "x".to_string()),
            ExportError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(418, "x".to_string()),
            ExportError::ApiError(_)
        ));
    }

    #[test]
    fn test_parse_retry_after_header_integer() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("120"),
        );

        assert_eq!(parse_retry_after_header(&response), 120);
    }

    #[test]
    fn test_parse_retry_after_header_missing() {
        let response = hyper::Response::builder().status(429).body(()).unwrap();
        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_invalid() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("invalid"),
        );

        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        let future_time = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(future_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        let retry_after = parse_retry_after_header(&response);
        assert!(
            (58..=61).contains(&retry_after),
            "Expected ~60, got {}",
            retry_after
        );
    }

    #[test]
    fn test_parse_retry_after_header_past_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        let past_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(past_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        // Past dates make no sense as a delay
        assert_eq!(parse_retry_after_header(&response), 5);
    }
}
