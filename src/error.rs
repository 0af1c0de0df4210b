// =============================================================================
// Typed error taxonomy — the one seam that must be matched, not string-sniffed
// =============================================================================
//
// Everywhere else in this crate uses `anyhow::Result` with `.context(...)`, the
// same idiom as the rest of the codebase. This enum exists only for the
// classification boundary described in the error-handling design: RetryManager,
// ExchangeClient, and OrderService all need to `match` on error category to
// decide whether to retry, trip the circuit breaker, or block a pair.
// =============================================================================

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Server,
    Timeout,
    Api,
    InsufficientBalance,
    MinOrderValue,
    Validation,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimit => "rateLimit",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::Api => "api",
            Self::InsufficientBalance => "insufficientBalance",
            Self::MinOrderValue => "minOrderValue",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl ErrorCategory {
    /// Whether RetryManager should retry this category at all.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimit | Self::Server | Self::Timeout | Self::Unknown
        )
    }

    /// Icon class for user-visible surfaces (§7 "user-visible behavior").
    pub fn icon_class(&self) -> &'static str {
        match self {
            Self::InsufficientBalance => "insufficient-balance",
            Self::MinOrderValue => "min-order-value",
            Self::Api => "api-error",
            Self::Network | Self::Timeout | Self::Server => "network-error",
            Self::Validation => "validation",
            Self::RateLimit => "api-error",
            Self::Unknown => "api-error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited{}", .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimit { retry_after: Option<f64> },

    #[error("server error: {status}: {body}")]
    Server { status: u16, body: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("exchange api error: {body}")]
    Api { body: String },

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: String, available: String },

    #[error("order value {value} below minimum notional {minimum}")]
    MinOrderValue { value: String, minimum: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("lock acquisition timed out after {0}s")]
    LockTimeout(f64),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::RateLimit { .. } => ErrorCategory::RateLimit,
            Self::Server { .. } => ErrorCategory::Server,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Api { .. } => ErrorCategory::Api,
            Self::InsufficientBalance { .. } => ErrorCategory::InsufficientBalance,
            Self::MinOrderValue { .. } => ErrorCategory::MinOrderValue,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::LockTimeout(_) => ErrorCategory::Unknown,
            Self::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Rule 2/3/4 of the classification order in §4.5 — caller-supplied
    /// classifiers (rule 1) are applied by RetryManager before falling back
    /// to this.
    pub fn classify_http(status: Option<u16>, message: &str) -> ErrorCategory {
        if let Some(status) = status {
            if status == 429 {
                return ErrorCategory::RateLimit;
            }
            if (500..600).contains(&status) {
                return ErrorCategory::Server;
            }
            if status == 408 || status == 504 {
                return ErrorCategory::Timeout;
            }
        }
        let lower = message.to_ascii_lowercase();
        if ["connection", "network", "timeout", "dns"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            return ErrorCategory::Network;
        }
        ErrorCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_codes() {
        assert_eq!(EngineError::classify_http(Some(429), ""), ErrorCategory::RateLimit);
        assert_eq!(EngineError::classify_http(Some(503), ""), ErrorCategory::Server);
        assert_eq!(EngineError::classify_http(Some(408), ""), ErrorCategory::Timeout);
        assert_eq!(EngineError::classify_http(Some(504), ""), ErrorCategory::Timeout);
    }

    #[test]
    fn classify_http_falls_back_to_keyword_match() {
        assert_eq!(
            EngineError::classify_http(None, "Connection reset by peer"),
            ErrorCategory::Network
        );
        assert_eq!(
            EngineError::classify_http(Some(200), "dns lookup failed"),
            ErrorCategory::Network
        );
        assert_eq!(EngineError::classify_http(None, "something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn retryable_categories() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::MinOrderValue.is_retryable());
    }
}
