use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use ledger_core::{Ledger, RetryPolicy};
use std::sync::Arc;
use tracing::info;
use wallet_gateway::auth::SessionAuth;
use wallet_gateway::clients::{
    ChannelVerifyClient, MessageRelayClient, MockTransferClient, TonExplorerClient,
};
use wallet_gateway::coordinator::WithdrawalCoordinator;
use wallet_gateway::handlers::{self, AppState};
use wallet_gateway::sweeper::spawn_sweeper;
use wallet_gateway::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wallet_gateway=debug".into()),
        )
        .init();

    let config = Config::from_env().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("config: {}", e))
    })?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting wallet gateway"
    );

    let ledger = Arc::new(Ledger::open(config.ledger_config()).await.map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("ledger open: {}", e))
    })?);

    let explorer = Arc::new(TonExplorerClient::new(
        config.explorer.base_url.clone(),
        config.explorer_timeout(),
        RetryPolicy::new(config.explorer_retry()),
    ));
    let channels = Arc::new(ChannelVerifyClient::new(
        config.channels.base_url.clone(),
        config.channels_timeout(),
    ));
    let relay = Arc::new(MessageRelayClient::new(
        config.relay.base_url.clone(),
        config.relay_timeout(),
    ));
    let transfer = Arc::new(MockTransferClient::new(
        config.transfer.mock_latency_ms,
        config.transfer.mock_success_rate,
    ));

    let coordinator = Arc::new(WithdrawalCoordinator::new(
        ledger.clone(),
        transfer,
        config.confirm_timeout(),
    ));

    spawn_sweeper(ledger.clone(), config.sweep_interval());

    let state = web::Data::new(AppState {
        ledger,
        coordinator,
        explorer,
        channels,
        relay,
    });

    let jwt_secret = config.auth.jwt_secret.clone();
    let workers = config.server.workers;
    let bind_addr = (config.server.host.clone(), config.server.port);

    // Middleware registered last runs outermost; CORS must sit outside the
    // session check so preflight OPTIONS requests never hit auth.
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(SessionAuth::new(jwt_secret.clone()))
            .wrap(Cors::permissive())
            .configure(handlers::configure)
    })
    .bind(bind_addr)?;

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.run().await
}
