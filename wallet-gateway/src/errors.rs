use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ledger_core::Error> for GatewayError {
    fn from(err: ledger_core::Error) -> Self {
        use ledger_core::Error as L;
        match err {
            L::UnknownWallet(msg) => GatewayError::NotFound(format!("unknown wallet address: {}", msg)),
            L::WalletNotFound(msg) => GatewayError::NotFound(format!("wallet not found: {}", msg)),
            L::EntryNotFound(msg) => GatewayError::NotFound(format!("entry not found: {}", msg)),
            L::InsufficientFunds { required, available } => GatewayError::InsufficientFunds {
                required: required.to_string(),
                available: available.to_string(),
            },
            L::InvalidEntry(msg) => GatewayError::Validation(msg),
            L::InvalidTransition(msg) => GatewayError::Validation(msg),
            L::DuplicateAddress(addr) => {
                GatewayError::Validation(format!("address already registered: {}", addr))
            }
            L::PrimaryWalletExists(user_id) => {
                GatewayError::Validation(format!("user {} already has a primary wallet", user_id))
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Upstream("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_ledger_error_mapping() {
        let err: GatewayError = ledger_core::Error::InsufficientFunds {
            required: Decimal::from(6),
            available: Decimal::from(5),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: GatewayError = ledger_core::Error::UnknownWallet("EQx".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: GatewayError = ledger_core::Error::Storage("disk".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
