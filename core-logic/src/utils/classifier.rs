use crate::error::{CoreError, NetworkError};
use serde::Serialize;
use std::fmt;

/// Coarse failure taxonomy used to pick a retry backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimited,
    ServerError,
    NetworkError,
    Aborted,
    Unknown,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ServerError => "server_error",
            ErrorClass::NetworkError => "network_error",
            ErrorClass::Aborted => "aborted",
            ErrorClass::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify a failure. Typed errors anywhere in the chain take precedence
/// over message text; within each source the rule order is
/// aborted, rate limited, server, network.
pub fn classify(error: &anyhow::Error) -> ErrorClass {
    if let Some(class) = classify_typed(error) {
        return class;
    }
    classify_message(&format!("{:#}", error))
}

fn classify_typed(error: &anyhow::Error) -> Option<ErrorClass> {
    for cause in error.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            match core {
                CoreError::Aborted { .. } => return Some(ErrorClass::Aborted),
                CoreError::Network(net) => return Some(classify_network(net)),
                _ => {}
            }
        }
        if let Some(net) = cause.downcast_ref::<NetworkError>() {
            return Some(classify_network(net));
        }
    }
    None
}

fn classify_network(error: &NetworkError) -> ErrorClass {
    match error {
        NetworkError::RateLimited { .. } => ErrorClass::RateLimited,
        NetworkError::HttpError { status_code: 429, .. } => ErrorClass::RateLimited,
        NetworkError::HttpError { status_code, .. } if (500..600).contains(status_code) => {
            ErrorClass::ServerError
        }
        NetworkError::Timeout { .. } | NetworkError::ConnectionRefused { .. } => {
            ErrorClass::NetworkError
        }
        NetworkError::HttpError { .. } | NetworkError::InvalidResponse { .. } => {
            ErrorClass::Unknown
        }
    }
}

fn classify_message(message: &str) -> ErrorClass {
    let msg = message.to_lowercase();

    if msg.contains("abort") || msg.contains("cancel") {
        return ErrorClass::Aborted;
    }
    if msg.contains("rate limit")
        || msg.contains("too many requests")
        || has_status(&msg, |s| s == "429")
    {
        return ErrorClass::RateLimited;
    }
    if msg.contains("server") || has_status(&msg, |s| s.starts_with('5')) {
        return ErrorClass::ServerError;
    }
    if ["network", "connection", "timed out", "timeout"]
        .iter()
        .any(|pattern| msg.contains(pattern))
    {
        return ErrorClass::NetworkError;
    }

    ErrorClass::Unknown
}

/// True if the message contains a standalone three-digit token matching `pred`.
fn has_status(msg: &str, pred: impl Fn(&str) -> bool) -> bool {
    msg.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()))
        .any(pred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_textual_rules() {
        assert_eq!(classify(&anyhow!("request aborted")), ErrorClass::Aborted);
        assert_eq!(classify(&anyhow!("HTTP 429")), ErrorClass::RateLimited);
        assert_eq!(classify(&anyhow!("Rate limit exceeded")), ErrorClass::RateLimited);
        assert_eq!(classify(&anyhow!("API request failed: 503")), ErrorClass::ServerError);
        assert_eq!(classify(&anyhow!("internal server error")), ErrorClass::ServerError);
        assert_eq!(classify(&anyhow!("connection reset by peer")), ErrorClass::NetworkError);
        assert_eq!(classify(&anyhow!("invalid payload")), ErrorClass::Unknown);
    }

    #[test]
    fn test_priority_first_match_wins() {
        // cancellation beats rate limiting
        assert_eq!(classify(&anyhow!("aborted after 429")), ErrorClass::Aborted);
        // "server" beats "connection"
        assert_eq!(classify(&anyhow!("server closed connection")), ErrorClass::ServerError);
    }

    #[test]
    fn test_digit_five_alone_is_not_server_error() {
        assert_eq!(classify(&anyhow!("retry in 5 seconds")), ErrorClass::Unknown);
        assert_eq!(classify(&anyhow!("session 5123 rejected")), ErrorClass::Unknown);
    }

    #[test]
    fn test_typed_errors() {
        let err = anyhow::Error::new(NetworkError::HttpError {
            status_code: 502,
            endpoint: "finalize".to_string(),
        });
        assert_eq!(classify(&err), ErrorClass::ServerError);

        let err = anyhow::Error::new(NetworkError::Timeout {
            timeout_ms: 8000,
            endpoint: "acquire".to_string(),
        });
        assert_eq!(classify(&err), ErrorClass::NetworkError);

        let err = anyhow::Error::new(CoreError::Aborted {
            context: "stop".to_string(),
        });
        assert_eq!(classify(&err), ErrorClass::Aborted);
    }

    #[test]
    fn test_typed_error_behind_context() {
        let err = anyhow::Error::new(NetworkError::HttpError {
            status_code: 429,
            endpoint: "acquire".to_string(),
        })
        .context("acquire failed");
        assert_eq!(classify(&err), ErrorClass::RateLimited);
    }
}
