//! Strategy catalog API
//!
//! - GET /api/strategies - List available allocation strategies

use axum::{routing::get, Json, Router};

use crate::api::ApiResponse;
use crate::services::list_strategies;
use crate::types::StrategyInfo;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_strategies))
}

async fn get_strategies() -> Json<ApiResponse<Vec<StrategyInfo>>> {
    Json(ApiResponse {
        data: list_strategies(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyKind;

    #[tokio::test]
    async fn test_strategies_in_catalog_order() {
        let Json(response) = get_strategies().await;
        let keys: Vec<StrategyKind> = response.data.iter().map(|s| s.key).collect();
        assert_eq!(keys, StrategyKind::ALL.to_vec());
    }
}
