//! Error taxonomy shared by the client, the API facade and the tool layer.
//!
//! Every failure surfaces at the MCP boundary as a failed tool call whose
//! text is the [`Display`](std::fmt::Display) rendering of the error.

/// Errors returned by [`EightSleepClient`](crate::client::EightSleepClient)
/// and [`EightSleepApi`](crate::api::EightSleepApi).
#[derive(Debug, thiserror::Error)]
pub enum EightSleepError {
    /// Required configuration (credentials, user id) is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Login failed, or the vendor rejected the token again after re-login.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The vendor returned a non-2xx status other than 401.
    #[error("Eight Sleep API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A caller-supplied argument is outside its contract.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// The vendor returned no data where some was expected.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure (connection refused, timeout, DNS, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The vendor response could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, EightSleepError>;

impl EightSleepError {
    /// Prefix the message with the name of the failing operation.
    ///
    /// The variant is preserved, so [`is_retryable`](Self::is_retryable) and
    /// any `matches!` on the error kind give the same answer before and after.
    #[must_use]
    pub fn context(self, operation: &str) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(format!("{operation}: {m}")),
            Self::Authentication(m) => Self::Authentication(format!("{operation}: {m}")),
            Self::Api { status, message } => Self::Api {
                status,
                message: format!("{operation}: {message}"),
            },
            Self::Validation(m) => Self::Validation(format!("{operation}: {m}")),
            Self::NotFound(m) => Self::NotFound(format!("{operation}: {m}")),
            Self::Protocol(m) => Self::Protocol(format!("{operation}: {m}")),
            Self::Http(e) => Self::Http(e),
        }
    }

    /// Whether a caller could reasonably retry the same operation later.
    ///
    /// Transport failures and vendor 429/5xx qualify. Nothing in
    /// this crate retries on its own beyond the single 401 re-login.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let err = EightSleepError::NotFound("no sleep data for 2024-01-01".into())
            .context("get_sleep_score");
        assert_eq!(
            err.to_string(),
            "Not found: get_sleep_score: no sleep data for 2024-01-01"
        );
    }

    #[test]
    fn context_keeps_api_status_and_retryability() {
        let err = EightSleepError::Api {
            status: 503,
            message: "maintenance".into(),
        };
        assert!(err.is_retryable());
        let err = err.context("list_alarms");
        assert!(err.is_retryable());
        match err {
            EightSleepError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "list_alarms: maintenance");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn auth_and_config_errors_are_not_retryable() {
        let auth = EightSleepError::Authentication("bad password".into()).context("get_hrv");
        assert!(!auth.is_retryable());
        assert!(matches!(auth, EightSleepError::Authentication(_)));

        let cfg = EightSleepError::Configuration("EIGHT_SLEEP_EMAIL not set".into())
            .context("get_hrv");
        assert!(!cfg.is_retryable());
        assert!(matches!(cfg, EightSleepError::Configuration(_)));
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = EightSleepError::Api {
            status: 400,
            message: "bad level".into(),
        };
        assert!(!err.is_retryable());
        let throttled = EightSleepError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert!(throttled.is_retryable());
    }
}
