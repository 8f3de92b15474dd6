use axum::response::{IntoResponse, Response};
use diesel::r2d2;
use http::StatusCode;
use std::fmt;

/// Crate-wide error type. Domain kinds are surfaced verbatim to the API
/// boundary; infrastructure errors are wrapped with their root cause kept
/// reachable through `source()`.
#[derive(Debug)]
pub enum LedgerError {
    // validation / domain
    InvalidAmount(String),
    InsufficientFunds,
    InvalidState(String),
    TransactionLimitExceeded,
    DailyLimitExceeded,
    DailyCountExceeded,
    WeeklyLimitExceeded,
    MonthlyLimitExceeded,
    CurrencyNotSupported(String),
    ExchangeRateNotFound(String),
    InvalidScheduledTime,
    InvalidBatchItems,
    BatchSizeExceeded,

    // lookups
    UserNotFound,
    TransactionNotFound,
    BalanceNotFound,
    ScheduledTransactionNotFound,
    BatchTransactionNotFound,
    LimitNotFound,

    // event store
    ConcurrentModification { expected: i64, actual: i64 },

    // resilience
    BreakerOpen(String),
    AllFallbacksFailed,
    Timeout,
    Cancelled,

    // infrastructure
    Database(diesel::result::Error),
    DatabaseConnection(String),
    Validation(validator::ValidationErrors),
    Bcrypt(bcrypt::BcryptError),
    Serialization(serde_json::Error),
    Internal(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InvalidAmount(msg) => write!(f, "invalid amount: {}", msg),
            LedgerError::InsufficientFunds => write!(f, "insufficient funds"),
            LedgerError::InvalidState(msg) => write!(f, "invalid state transition: {}", msg),
            LedgerError::TransactionLimitExceeded => write!(f, "single transaction limit exceeded"),
            LedgerError::DailyLimitExceeded => write!(f, "daily limit exceeded"),
            LedgerError::DailyCountExceeded => write!(f, "daily transaction count exceeded"),
            LedgerError::WeeklyLimitExceeded => write!(f, "weekly limit exceeded"),
            LedgerError::MonthlyLimitExceeded => write!(f, "monthly limit exceeded"),
            LedgerError::CurrencyNotSupported(code) => write!(f, "currency not supported: {}", code),
            LedgerError::ExchangeRateNotFound(pair) => write!(f, "exchange rate not found: {}", pair),
            LedgerError::InvalidScheduledTime => write!(f, "scheduled time must be in the future"),
            LedgerError::InvalidBatchItems => write!(f, "batch must contain at least one item"),
            LedgerError::BatchSizeExceeded => write!(f, "batch exceeds maximum item count"),
            LedgerError::UserNotFound => write!(f, "user not found"),
            LedgerError::TransactionNotFound => write!(f, "transaction not found"),
            LedgerError::BalanceNotFound => write!(f, "balance not found"),
            LedgerError::ScheduledTransactionNotFound => write!(f, "scheduled transaction not found"),
            LedgerError::BatchTransactionNotFound => write!(f, "batch transaction not found"),
            LedgerError::LimitNotFound => write!(f, "no transaction limit configured"),
            LedgerError::ConcurrentModification { expected, actual } => write!(
                f,
                "concurrent modification detected: expected version {}, got {}",
                expected, actual
            ),
            LedgerError::BreakerOpen(name) => write!(f, "circuit breaker {} is open", name),
            LedgerError::AllFallbacksFailed => write!(f, "all fallback attempts failed"),
            LedgerError::Timeout => write!(f, "operation timed out"),
            LedgerError::Cancelled => write!(f, "operation cancelled"),
            LedgerError::Database(e) => write!(f, "database error: {}", e),
            LedgerError::DatabaseConnection(e) => write!(f, "database connection error: {}", e),
            LedgerError::Validation(e) => write!(f, "validation error: {}", e),
            LedgerError::Bcrypt(e) => write!(f, "password hashing error: {}", e),
            LedgerError::Serialization(e) => write!(f, "serialization error: {}", e),
            LedgerError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Database(e) => Some(e),
            LedgerError::Validation(e) => Some(e),
            LedgerError::Bcrypt(e) => Some(e),
            LedgerError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

// Repositories map diesel's `NotFound` to the context-correct kind at each
// call site; this fallback only wraps genuine database failures.
impl From<diesel::result::Error> for LedgerError {
    fn from(err: diesel::result::Error) -> Self {
        LedgerError::Database(err)
    }
}

impl From<r2d2::Error> for LedgerError {
    fn from(err: r2d2::Error) -> Self {
        LedgerError::DatabaseConnection(err.to_string())
    }
}

impl From<::r2d2::Error> for LedgerError {
    fn from(err: ::r2d2::Error) -> Self {
        LedgerError::DatabaseConnection(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(err: validator::ValidationErrors) -> Self {
        LedgerError::Validation(err)
    }
}

impl From<bcrypt::BcryptError> for LedgerError {
    fn from(err: bcrypt::BcryptError) -> Self {
        LedgerError::Bcrypt(err)
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err)
    }
}

impl From<LedgerError> for (StatusCode, String) {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidState(_)
            | LedgerError::CurrencyNotSupported(_)
            | LedgerError::InvalidScheduledTime
            | LedgerError::InvalidBatchItems
            | LedgerError::BatchSizeExceeded
            | LedgerError::Validation(_) => StatusCode::BAD_REQUEST,

            LedgerError::InsufficientFunds
            | LedgerError::TransactionLimitExceeded
            | LedgerError::DailyLimitExceeded
            | LedgerError::DailyCountExceeded
            | LedgerError::WeeklyLimitExceeded
            | LedgerError::MonthlyLimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,

            LedgerError::UserNotFound
            | LedgerError::TransactionNotFound
            | LedgerError::BalanceNotFound
            | LedgerError::ScheduledTransactionNotFound
            | LedgerError::BatchTransactionNotFound
            | LedgerError::LimitNotFound
            | LedgerError::ExchangeRateNotFound(_) => StatusCode::NOT_FOUND,

            LedgerError::ConcurrentModification { .. } => StatusCode::CONFLICT,

            LedgerError::BreakerOpen(_) | LedgerError::AllFallbacksFailed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            LedgerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            LedgerError::Cancelled => StatusCode::REQUEST_TIMEOUT,

            LedgerError::Database(_)
            | LedgerError::DatabaseConnection(_)
            | LedgerError::Bcrypt(_)
            | LedgerError::Serialization(_)
            | LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, err.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, body): (StatusCode, String) = self.into();
        (status, axum::Json(serde_json::json!({ "error": body }))).into_response()
    }
}

impl LedgerError {
    /// Transient errors may be retried by the caller; terminal errors are
    /// final for the request that produced them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::BreakerOpen(_)
                | LedgerError::Timeout
                | LedgerError::DatabaseConnection(_)
                | LedgerError::ConcurrentModification { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let (status, _): (StatusCode, String) = LedgerError::BalanceNotFound.into();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn version_conflict_maps_to_409() {
        let err = LedgerError::ConcurrentModification { expected: 5, actual: 6 };
        assert!(err.is_transient());
        let (status, body): (StatusCode, String) = err.into();
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("expected version 5"));
    }

    #[test]
    fn limit_errors_are_terminal() {
        assert!(!LedgerError::DailyLimitExceeded.is_transient());
        assert!(!LedgerError::InsufficientFunds.is_transient());
        assert!(LedgerError::Timeout.is_transient());
    }
}
