//! PIX deposit through the router: intent creation, webhook, single mint
//!
//! Engine and provider are one local stub server; records live in an
//! in-memory SQLite store.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use megabolsa::api::{create_router, AppState};
use megabolsa::common::config::{EngineConfig, HttpConfig, PaymentProviderConfig, PollerConfig};
use megabolsa::{MegabolsaConfig, PaymentStore, SqliteStore};

#[derive(Default)]
struct Upstream {
    created: Option<Value>,
    mints: Vec<Value>,
}

type Shared = Arc<Mutex<Upstream>>;

async fn create_payment(State(shared): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let payment = json!({
        "id": 555001,
        "status": "pending",
        "transaction_amount": body["transaction_amount"],
        "metadata": body["metadata"],
        "point_of_interaction": {
            "transaction_data": {"qr_code": "00020126PIX", "qr_code_base64": "iVBORw0KGgo="}
        }
    });
    shared.lock().unwrap().created = Some(payment.clone());
    (StatusCode::CREATED, Json(payment))
}

/// Whatever was created, now approved
async fn get_payment(State(shared): State<Shared>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    let created = shared.lock().unwrap().created.clone();
    match created {
        Some(mut payment) if id == "555001" => {
            payment["status"] = json!("approved");
            (StatusCode::OK, Json(payment))
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({"message": "Payment not found"}))),
    }
}

async fn mint_to(State(shared): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut upstream = shared.lock().unwrap();
    upstream.mints.push(body);
    Json(json!({"result": {"queueId": format!("q-{}", upstream.mints.len())}}))
}

async fn spawn_upstream() -> (String, Shared) {
    let shared: Shared = Arc::default();
    let app = Router::new()
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments/:id", get(get_payment))
        .route("/contract/:chain/:token/erc20/mint-to", post(mint_to))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}", addr), shared)
}

fn config(base_url: &str) -> MegabolsaConfig {
    let mut config = MegabolsaConfig::default();
    config.engine = Some(EngineConfig {
        base_url: base_url.to_string(),
        secret_key: "engine-secret".to_string(),
        operator_address: "0xoperator".to_string(),
        token_address: "0xtoken".to_string(),
        chain_id: 84532,
    });
    config.payments = Some(PaymentProviderConfig {
        api_url: base_url.to_string(),
        access_token: "TEST-token".to_string(),
    });
    config.public_base_url = "https://megabolsa.example".to_string();
    config.http = HttpConfig {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_delay: Duration::from_millis(10),
    };
    config.poller = PollerConfig {
        max_attempts: 2,
        interval: Duration::from_millis(5),
    };
    config
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn approved_deposit_mints_once() {
    let (base_url, upstream) = spawn_upstream().await;
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let state = AppState::from_config(&config(&base_url), store.clone()).unwrap();
    let app = create_router(state);

    let (code, intent) = post_json(
        app.clone(),
        "/pix/create-payment",
        json!({"amount": "12.90", "recipientAddress": "0xbuyer"}),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(intent["paymentId"], "555001");
    assert_eq!(intent["qrCode"], "00020126PIX");

    let notification = json!({"type": "payment", "action": "payment.updated", "data": {"id": "555001"}});

    let (code, first) = post_json(app.clone(), "/pix/webhook", notification.clone()).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(first["queueId"], "q-1");
    assert_eq!(first["tokenAmount"], "12");

    let (code, second) = post_json(app, "/pix/webhook", notification).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(second["message"], "Payment already processed");

    let upstream = upstream.lock().unwrap();
    assert_eq!(upstream.mints.len(), 1);
    assert_eq!(upstream.mints[0]["toAddress"], "0xbuyer");
    assert_eq!(upstream.mints[0]["amount"], "12");
    drop(upstream);

    let mint = store.get_mint("555001").await.unwrap().unwrap();
    assert_eq!(mint.queue_id.as_deref(), Some("q-1"));
}

#[tokio::test]
async fn webhook_for_unknown_payment_asks_for_redelivery() {
    let (base_url, upstream) = spawn_upstream().await;
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let app = create_router(AppState::from_config(&config(&base_url), store).unwrap());

    let (code, _) = post_json(app, "/pix/webhook", json!({"type": "payment", "data": {"id": "404404"}})).await;
    assert!(code.is_server_error());
    assert!(upstream.lock().unwrap().mints.is_empty());
}
