//! API Server Module
//!
//! Application state, router assembly and server startup. Services whose
//! configuration is missing stay `None`; their endpoints answer 500
//! "Server misconfigured" instead of failing at startup.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::common::config::MegabolsaConfig;
use crate::common::error::AppError;
use crate::engine::{ThirdwebEngineClient, TokenEngine, TokenGateway};
use crate::payments::{MercadoPagoClient, PaymentIntentService, PaymentProvider, WebhookReconciler};
use crate::storage::{PaymentStore, WithdrawalStore};
use crate::withdrawal::WithdrawalService;

use super::middleware::{
    create_rate_limiter, rate_limit_middleware, request_logging_middleware,
    security_headers_middleware, RateLimitConfig, RateLimitState,
};
use super::routes;

/// Combined application state for all API endpoints
pub struct AppState {
    /// Mint/burn gateway; `None` without engine configuration
    pub gateway: Option<Arc<TokenGateway>>,
    /// PIX intents; `None` without provider configuration
    pub intents: Option<Arc<PaymentIntentService>>,
    /// Webhook reconciliation; needs both engine and provider
    pub reconciler: Option<Arc<WebhookReconciler>>,
    pub withdrawals: Option<Arc<WithdrawalService>>,
    /// Tokens granted by `/claimToken`
    pub claim_amount: u64,
    pub claim_limiter: RateLimitState,
    pub payment_limiter: RateLimitState,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Wire services from already-built collaborators
    pub fn assemble<S>(
        config: &MegabolsaConfig,
        engine: Option<Arc<dyn TokenEngine>>,
        provider: Option<Arc<dyn PaymentProvider>>,
        store: Arc<S>,
    ) -> SharedAppState
    where
        S: PaymentStore + WithdrawalStore + 'static,
    {
        let payment_store: Arc<dyn PaymentStore> = store.clone();
        let withdrawal_store: Arc<dyn WithdrawalStore> = store;

        let gateway = engine.map(|engine| Arc::new(TokenGateway::new(engine, config.poller.clone())));

        let reconciler = match (&provider, &gateway) {
            (Some(provider), Some(gateway)) => Some(Arc::new(WebhookReconciler::new(
                provider.clone(),
                gateway.clone(),
                payment_store.clone(),
            ))),
            _ => None,
        };

        let intents = provider.map(|provider| {
            Arc::new(PaymentIntentService::new(
                provider,
                payment_store,
                config.public_base_url.clone(),
                reconciler.clone(),
            ))
        });

        let withdrawals = gateway
            .as_ref()
            .map(|gateway| Arc::new(WithdrawalService::new(gateway.clone(), withdrawal_store)));

        Arc::new(Self {
            gateway,
            intents,
            reconciler,
            withdrawals,
            claim_amount: config.claim_amount,
            claim_limiter: create_rate_limiter(RateLimitConfig::strict()),
            payment_limiter: create_rate_limiter(RateLimitConfig::default()),
        })
    }

    /// Build HTTP clients for every configured section
    pub fn from_config<S>(config: &MegabolsaConfig, store: Arc<S>) -> Result<SharedAppState, AppError>
    where
        S: PaymentStore + WithdrawalStore + 'static,
    {
        let engine: Option<Arc<dyn TokenEngine>> = match &config.engine {
            Some(engine) => Some(Arc::new(ThirdwebEngineClient::new(
                engine.clone(),
                config.http.clone(),
            )?)),
            None => None,
        };

        let provider: Option<Arc<dyn PaymentProvider>> = match &config.payments {
            Some(payments) => Some(Arc::new(MercadoPagoClient::new(
                payments.clone(),
                config.http.clone(),
            )?)),
            None => None,
        };

        Ok(Self::assemble(config, engine, provider, store))
    }
}

/// Build the router
pub fn create_router(state: SharedAppState) -> Router {
    // CORS configuration - allow frontend origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let claim = Router::new()
        .route("/claimToken", post(routes::claim::handle_claim_token))
        .route_layer(middleware::from_fn_with_state(
            state.claim_limiter.clone(),
            rate_limit_middleware,
        ));

    let payments = Router::new()
        .route(
            "/pix/create-payment",
            post(routes::pix::handle_create_payment).get(routes::pix::handle_query_payment),
        )
        .route_layer(middleware::from_fn_with_state(
            state.payment_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::handle_health))
        .route(
            "/pix/webhook",
            post(routes::pix::handle_webhook).get(routes::pix::handle_webhook_liveness),
        )
        .route("/withdraw", post(routes::withdraw::handle_withdraw))
        .route("/withdraw/:id", get(routes::withdraw::handle_withdrawal_status))
        .route("/positions/evaluate", post(routes::positions::handle_evaluate))
        .route("/positions/portfolio", post(routes::positions::handle_portfolio))
        .merge(claim)
        .merge(payments)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    spawn_limiter_cleanup(&state);

    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== Megabolsa API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /claimToken             - Fixed token grant");
    println!("  POST /pix/create-payment     - Create PIX deposit");
    println!("  GET  /pix/create-payment     - Poll deposit status");
    println!("  POST /pix/webhook            - Provider notifications");
    println!("  POST /withdraw               - Burn tokens and queue payout");
    println!("  GET  /withdraw/:id           - Withdrawal status");
    println!("  POST /positions/evaluate     - Value one position");
    println!("  POST /positions/portfolio    - Portfolio statistics");
    println!("  GET  /health                 - Health check");
    println!();

    tracing::info!(target: "megabolsa::api", %addr, "API server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn spawn_limiter_cleanup(state: &SharedAppState) {
    let limiters = [state.claim_limiter.clone(), state.payment_limiter.clone()];
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(120));
        loop {
            interval.tick().await;
            for limiter in &limiters {
                limiter.cleanup().await;
            }
        }
    });
}
