pub mod accounts;
pub mod health;
pub mod strategies;

use crate::services::LedgerError;
use crate::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/strategies", strategies::router())
        .nest("/api/accounts", accounts::router())
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl LedgerError {
    fn status(&self) -> StatusCode {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::BotNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InsufficientFunds { .. } | LedgerError::InvalidAmount(_) => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::InvalidState { .. } => StatusCode::CONFLICT,
            LedgerError::PricingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::RecommendationFailed(_) | LedgerError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert LedgerError to HTTP response.
impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BotStatus;

    #[test]
    fn test_ledger_error_status() {
        assert_eq!(
            LedgerError::AccountNotFound("a".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                needed: 10.0,
                available: 1.0
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::InvalidState {
                bot_id: "b".into(),
                status: BotStatus::Active,
                operation: "delete".into()
            }
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LedgerError::PricingUnavailable("BTC".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_response_serialization() {
        let body = ErrorResponse {
            error: "Bot not found: x".to_string(),
            code: "BOT_NOT_FOUND".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"code\":\"BOT_NOT_FOUND\""));
    }
}
