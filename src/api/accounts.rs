//! Accounts API
//!
//! Thin handlers over the ledger:
//!
//! Accounts:
//! - POST /api/accounts - Create an account (idempotent per user)
//! - GET /api/accounts/:user_id - Account with valuation summary
//! - GET /api/accounts/:user_id/recommendation - Strategy recommendation
//! - GET /api/accounts/:user_id/risk - Risk assessment
//!
//! Bots:
//! - POST /api/accounts/:user_id/bots - Deploy a bot
//! - POST /api/accounts/:user_id/bots/:bot_id/stop - Stop and liquidate
//! - POST /api/accounts/:user_id/bots/:bot_id/resume - Resume a stopped bot
//! - DELETE /api/accounts/:user_id/bots/:bot_id - Delete a stopped bot
//! - POST /api/accounts/:user_id/bots/:bot_id/trades - Record a manual trade
//! - POST /api/accounts/:user_id/bots/:bot_id/revalue - Revalue now
//! - GET /api/accounts/:user_id/bots/:bot_id/performance - Performance history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::services::{LedgerError, RevalueOutcome};
use crate::types::{
    Account, Bot, BotPerformance, Recommendation, RiskAssessment, StrategyKind, Trade,
    TradeAction,
};
use crate::AppState;

const DEFAULT_RISK_PROFILE: u8 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_account))
        .route("/:user_id", get(get_account))
        .route("/:user_id/recommendation", get(get_recommendation))
        .route("/:user_id/risk", get(get_risk))
        .route("/:user_id/bots", post(deploy_bot))
        .route("/:user_id/bots/:bot_id", delete(delete_bot))
        .route("/:user_id/bots/:bot_id/stop", post(stop_bot))
        .route("/:user_id/bots/:bot_id/resume", post(resume_bot))
        .route("/:user_id/bots/:bot_id/trades", post(execute_trade))
        .route("/:user_id/bots/:bot_id/revalue", post(revalue_bot))
        .route("/:user_id/bots/:bot_id/performance", get(get_performance))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub user_id: String,
    pub initial_balance: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployBotRequest {
    pub strategy: StrategyKind,
    #[serde(default = "default_risk_profile")]
    pub risk_profile: u8,
    pub allocated_fund: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub asset: String,
    pub action: TradeAction,
    pub amount: f64,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationQuery {
    pub risk_profile: Option<u8>,
}

fn default_risk_profile() -> u8 {
    DEFAULT_RISK_PROFILE
}

/// Account plus its valuation at the bots' last marks.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub portfolio_value: f64,
    pub total_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            portfolio_value: account.portfolio_value(),
            total_value: account.total_value(),
            pnl: account.pnl(),
            pnl_percent: account.pnl_percent(),
            account,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub bot_id: String,
    pub liquidation_value: f64,
}

// =============================================================================
// Account Handlers
// =============================================================================

async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<ApiResponse<AccountView>>, LedgerError> {
    let account = state
        .ledger
        .create_account(&request.user_id, request.initial_balance)
        .await?;
    Ok(Json(ApiResponse {
        data: account.into(),
    }))
}

async fn get_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<AccountView>>, LedgerError> {
    let account = state.ledger.get_account(&user_id).await?;
    Ok(Json(ApiResponse {
        data: account.into(),
    }))
}

async fn get_recommendation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<ApiResponse<Recommendation>>, LedgerError> {
    let risk_profile = query.risk_profile.unwrap_or(DEFAULT_RISK_PROFILE);
    let recommendation = state
        .ledger
        .get_recommendation(&user_id, risk_profile)
        .await?;
    Ok(Json(ApiResponse {
        data: recommendation,
    }))
}

async fn get_risk(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<RiskAssessment>>, LedgerError> {
    let assessment = state.ledger.get_risk_assessment(&user_id).await?;
    Ok(Json(ApiResponse { data: assessment }))
}

// =============================================================================
// Bot Handlers
// =============================================================================

async fn deploy_bot(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<DeployBotRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Bot>>), LedgerError> {
    let bot = state
        .ledger
        .deploy_bot(
            &user_id,
            request.strategy,
            request.risk_profile,
            request.allocated_fund,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse { data: bot })))
}

async fn stop_bot(
    State(state): State<AppState>,
    Path((user_id, bot_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<StopResponse>>, LedgerError> {
    let liquidation_value = state.ledger.stop_bot(&user_id, &bot_id).await?;
    Ok(Json(ApiResponse {
        data: StopResponse {
            bot_id,
            liquidation_value,
        },
    }))
}

async fn resume_bot(
    State(state): State<AppState>,
    Path((user_id, bot_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Bot>>, LedgerError> {
    let bot = state.ledger.resume_bot(&user_id, &bot_id).await?;
    Ok(Json(ApiResponse { data: bot }))
}

async fn delete_bot(
    State(state): State<AppState>,
    Path((user_id, bot_id)): Path<(String, String)>,
) -> Result<StatusCode, LedgerError> {
    state.ledger.delete_bot(&user_id, &bot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn execute_trade(
    State(state): State<AppState>,
    Path((user_id, bot_id)): Path<(String, String)>,
    Json(request): Json<TradeRequest>,
) -> Result<Json<ApiResponse<Trade>>, LedgerError> {
    let trade = state
        .ledger
        .execute_trade(
            &user_id,
            &bot_id,
            &request.asset,
            request.action,
            request.amount,
            request.price,
        )
        .await?;
    Ok(Json(ApiResponse { data: trade }))
}

async fn revalue_bot(
    State(state): State<AppState>,
    Path((user_id, bot_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<RevalueOutcome>>, LedgerError> {
    let outcome = state.ledger.revalue_bot(&user_id, &bot_id).await?;
    Ok(Json(ApiResponse { data: outcome }))
}

async fn get_performance(
    State(state): State<AppState>,
    Path((user_id, bot_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<BotPerformance>>, LedgerError> {
    let performance = state.ledger.get_bot_performance(&user_id, &bot_id).await?;
    Ok(Json(ApiResponse { data: performance }))
}
