//! Operator hints for failed Lambda calls.
//!
//! The run is fail-fast and nothing is retried here; the SDK applies its own
//! retry policy before an error reaches us. This module only reads the
//! error chain and picks a one-line hint to print next to it, so the
//! operator knows whether to fix permissions, arguments, or just re-run.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Rate limited; re-running later usually succeeds.
    Throttled { error_code: String },
    /// Request timed out or the connection failed.
    Network,
    /// Transient provider-side failure.
    ServiceUnavailable,
    /// Credentials missing or not allowed to perform the call.
    PermissionDenied { error_code: String },
    /// A function or layer referenced by the call does not exist.
    NotFound { error_code: String },
    /// The function is mid-update and rejected another change.
    Conflict,
    /// The request itself was rejected (bad role, runtime, size...).
    InvalidRequest { error_code: String },
    Other { error_code: Option<String> },
}

impl ErrorCategory {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Throttled { .. }
                | ErrorCategory::Network
                | ErrorCategory::ServiceUnavailable
                | ErrorCategory::Conflict
        )
    }

    /// One-line suggestion printed after the error chain.
    pub fn hint(&self) -> String {
        match self {
            ErrorCategory::Throttled { error_code } => {
                format!("{}: Lambda is rate limiting requests; re-run in a moment", error_code)
            }
            ErrorCategory::Network => {
                "Network error: check connectivity and the endpoint/region".to_string()
            }
            ErrorCategory::ServiceUnavailable => {
                "Lambda is temporarily unavailable; re-run later".to_string()
            }
            ErrorCategory::PermissionDenied { error_code } => format!(
                "{}: the credentials in use lack permission (lambda:GetFunction, \
                 lambda:CreateFunction, lambda:UpdateFunction*, iam:PassRole)",
                error_code
            ),
            ErrorCategory::NotFound { error_code } => format!(
                "{}: a referenced function, layer or role does not exist in this region",
                error_code
            ),
            ErrorCategory::Conflict => {
                "The target function is still being updated; wait and re-run".to_string()
            }
            ErrorCategory::InvalidRequest { error_code } => {
                format!("{}: the provider rejected the request parameters", error_code)
            }
            ErrorCategory::Other { error_code } => match error_code {
                Some(code) => format!("{}: see the error details above", code),
                None => "See the error details above".to_string(),
            },
        }
    }

    pub fn short_label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttled { .. } => "throttled",
            ErrorCategory::Network => "network",
            ErrorCategory::ServiceUnavailable => "unavailable",
            ErrorCategory::PermissionDenied { .. } => "permission",
            ErrorCategory::NotFound { .. } => "not-found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::InvalidRequest { .. } => "invalid",
            ErrorCategory::Other { .. } => "error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint())
    }
}

/// Categorize an error by walking its full chain.
pub fn categorize_error(error: &anyhow::Error) -> ErrorCategory {
    // Debug output includes the SDK's service error code, Display often
    // only says "service error".
    let detail = format!("{:?}", error);
    categorize_error_string(&detail)
}

pub fn categorize_error_string(error_str: &str) -> ErrorCategory {
    const THROTTLING: &[&str] = &[
        "TooManyRequestsException",
        "ThrottlingException",
        "Throttling",
        "RequestLimitExceeded",
        "Rate exceeded",
    ];
    const PERMISSION: &[&str] = &[
        "AccessDeniedException",
        "AccessDenied",
        "UnrecognizedClientException",
        "InvalidClientTokenId",
        "ExpiredTokenException",
        "SignatureDoesNotMatch",
        "not authorized",
        "NoCredentials",
        "no credentials",
    ];
    const NOT_FOUND: &[&str] = &["ResourceNotFoundException"];
    const CONFLICT: &[&str] = &["ResourceConflictException", "ResourceInUseException"];
    const INVALID: &[&str] = &[
        "InvalidParameterValueException",
        "CodeStorageExceededException",
        "RequestTooLargeException",
        "InvalidZipFileException",
        "ValidationException",
    ];

    if let Some(code) = first_match(error_str, THROTTLING) {
        return ErrorCategory::Throttled {
            error_code: code.to_string(),
        };
    }
    if let Some(code) = first_match(error_str, PERMISSION) {
        return ErrorCategory::PermissionDenied {
            error_code: code.to_string(),
        };
    }
    if let Some(code) = first_match(error_str, NOT_FOUND) {
        return ErrorCategory::NotFound {
            error_code: code.to_string(),
        };
    }
    if first_match(error_str, CONFLICT).is_some() {
        return ErrorCategory::Conflict;
    }
    if let Some(code) = first_match(error_str, INVALID) {
        return ErrorCategory::InvalidRequest {
            error_code: code.to_string(),
        };
    }

    if error_str.contains("ServiceException")
        || error_str.contains("ServiceUnavailable")
        || error_str.contains("InternalServerError")
    {
        return ErrorCategory::ServiceUnavailable;
    }

    if error_str.contains("DispatchFailure")
        || error_str.contains("TimeoutError")
        || error_str.contains("timed out")
        || error_str.contains("dns error")
        || error_str.contains("ConnectorError")
        || error_str.contains("connection refused")
        || error_str.contains("Connection refused")
        || error_str.contains("connection reset")
    {
        return ErrorCategory::Network;
    }

    ErrorCategory::Other {
        error_code: extract_error_code(error_str),
    }
}

fn first_match<'a>(haystack: &str, needles: &[&'a str]) -> Option<&'a str> {
    needles.iter().copied().find(|n| haystack.contains(n))
}

/// Pull `code: Some("X")` out of SDK debug output.
fn extract_error_code(error_str: &str) -> Option<String> {
    let start = error_str.find("code: Some(\"")? + "code: Some(\"".len();
    let rest = &error_str[start..];
    let end = rest.find('"')?;
    let code = &rest[..end];
    if code.is_empty() || code.len() >= 64 {
        None
    } else {
        Some(code.to_string())
    }
}
