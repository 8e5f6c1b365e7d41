//! HTTP API handlers
//!
//! Thin layer over the ledger and the external clients: decode, validate,
//! check ownership against the session, delegate, wrap in the response
//! envelope. No balance arithmetic happens here.

use crate::auth::AuthContext;
use crate::clients::{ChainExplorer, ChannelVerifier, MessageRelay};
use crate::coordinator::WithdrawalCoordinator;
use crate::errors::{GatewayError, Result};
use crate::models::{
    ChannelVerifyRequest, DepositRequest, EntryView, RegisterWalletRequest, SendMessageRequest,
    WalletView, WithdrawRequest, NANO_PER_TON,
};
use actix_web::{web, HttpResponse};
use ledger_core::{DepositEvent, IngestOutcome, Ledger, WalletAddress};
use prometheus::{Encoder, TextEncoder};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub coordinator: Arc<WithdrawalCoordinator>,
    pub explorer: Arc<dyn ChainExplorer>,
    pub channels: Arc<dyn ChannelVerifier>,
    pub relay: Arc<dyn MessageRelay>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .service(
            web::scope("/api/v1")
                .route("/wallets", web::post().to(register_wallet))
                .route("/wallets/{user_id}", web::get().to(list_wallets))
                .route("/balance/{wallet_id}", web::get().to(get_balance))
                .route("/entries/{wallet_id}", web::get().to(list_entries))
                .route("/deposits", web::post().to(ingest_deposit))
                .route("/withdrawals", web::post().to(withdraw))
                .route("/chain/balance/{address}", web::get().to(chain_balance))
                .route("/channels/verify", web::post().to(verify_channel))
                .route("/messages/send", web::post().to(send_message)),
        );
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let stats = state.ledger.stats().ok();
    HttpResponse::Ok().json(json!({
        "success": true,
        "status": "healthy",
        "service": "wallet-gateway",
        "entries": stats.as_ref().map(|s| s.total_entries),
    }))
}

async fn metrics(state: web::Data<AppState>) -> Result<HttpResponse> {
    let encoder = TextEncoder::new();
    let families = state.ledger.metrics().registry().gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| GatewayError::Internal(format!("metrics encode: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer))
}

async fn register_wallet(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<RegisterWalletRequest>,
) -> Result<HttpResponse> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let wallet = state
        .ledger
        .register_wallet(
            ctx.telegram_user_id,
            WalletAddress::new(&body.address),
            body.is_primary,
        )
        .await?;

    info!(user_id = ctx.telegram_user_id, wallet_id = %wallet.wallet_id, "Wallet registered");

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "wallet": WalletView::from(&wallet),
    })))
}

async fn list_wallets(
    state: web::Data<AppState>,
    ctx: AuthContext,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    if user_id != ctx.telegram_user_id {
        return Err(GatewayError::Unauthorized(
            "cannot list another user's wallets".to_string(),
        ));
    }

    let wallets = state.ledger.wallets_for_user(user_id).await?;
    let views: Vec<WalletView> = wallets.iter().map(WalletView::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "wallets": views,
    })))
}

/// Resolve a wallet and require it to belong to the session user.
async fn owned_wallet(
    state: &AppState,
    ctx: &AuthContext,
    wallet_id: Uuid,
) -> Result<ledger_core::Wallet> {
    let wallet = state.ledger.get_wallet(wallet_id).await?;
    if wallet.user_id != ctx.telegram_user_id {
        return Err(GatewayError::Unauthorized(
            "wallet belongs to another user".to_string(),
        ));
    }
    Ok(wallet)
}

async fn get_balance(
    state: web::Data<AppState>,
    ctx: AuthContext,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let wallet_id = path.into_inner();
    owned_wallet(&state, &ctx, wallet_id).await?;

    let balance = state.ledger.get_balance(wallet_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "wallet_id": wallet_id,
        "balance": balance.amount,
    })))
}

async fn list_entries(
    state: web::Data<AppState>,
    ctx: AuthContext,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let wallet_id = path.into_inner();
    owned_wallet(&state, &ctx, wallet_id).await?;

    let entries = state.ledger.wallet_entries(wallet_id).await?;
    let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "wallet_id": wallet_id,
        "entries": views,
    })))
}

async fn ingest_deposit(
    state: web::Data<AppState>,
    _ctx: AuthContext,
    body: web::Json<DepositRequest>,
) -> Result<HttpResponse> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let event = DepositEvent {
        wallet_address: WalletAddress::new(&body.wallet_address),
        tx_hash: body.tx_hash.clone(),
        amount: body.amount,
        from_address: body.from_address.as_deref().map(WalletAddress::new),
    };

    let outcome = state.ledger.ingest_deposit(event).await?;

    match outcome {
        IngestOutcome::Credited(entry) => {
            // Delivery notification is best effort; a relay outage must not
            // fail the deposit. It goes to the wallet owner, who may differ
            // from whoever posted the ingest (e.g. a chain monitor).
            let relay = state.relay.clone();
            let user_id = entry.user_id;
            let amount = entry.amount;
            tokio::spawn(async move {
                let text = format!("Deposit of {} TON credited", amount);
                if let Err(e) = relay.send(user_id, &text).await {
                    warn!(user_id, error = %e, "Deposit notification failed");
                }
            });

            Ok(HttpResponse::Created().json(json!({
                "success": true,
                "already_processed": false,
                "entry": EntryView::from(&entry),
            })))
        }
        IngestOutcome::AlreadyProcessed(entry_id) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "already_processed": true,
            "entry_id": entry_id,
        }))),
    }
}

async fn withdraw(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<WithdrawRequest>,
) -> Result<HttpResponse> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let entry = state
        .coordinator
        .withdraw(
            ctx.telegram_user_id,
            body.amount,
            WalletAddress::new(&body.destination),
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "entry": EntryView::from(&entry),
    })))
}

async fn chain_balance(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let address = path.into_inner();
    if address.is_empty() {
        return Err(GatewayError::Validation("address is empty".to_string()));
    }

    let nano = state.explorer.nano_balance(&address).await?;
    let ton = Decimal::from(nano) / Decimal::from(NANO_PER_TON);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "address": address,
        "balance": ton,
        "nano": nano,
    })))
}

async fn verify_channel(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<ChannelVerifyRequest>,
) -> Result<HttpResponse> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let ownership = state
        .channels
        .verify(&body.channel, ctx.telegram_user_id)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "channel": body.channel,
        "is_owner": ownership.owner_id == ctx.telegram_user_id,
        "ownership": ownership,
    })))
}

async fn send_message(
    state: web::Data<AppState>,
    _ctx: AuthContext,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let receipt = state.relay.send(body.to, &body.message).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "receipt": receipt,
    })))
}
