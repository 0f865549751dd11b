//! # REST API
//!
//! Builds the axum router that exposes the hub over HTTP. Every handler
//! shares the [`Hub`] and the metrics through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path             | Body                     | Success payload                  |
//! |--------|------------------|--------------------------|----------------------------------|
//! | GET    | `/health`        |                          | `{"status":"ok"}`                |
//! | POST   | `/pray/knock`    | `{address, note?}`       | `{total_tokens, add_tokens, note?}` |
//! | POST   | `/pray/reply`    | `{id, note, address}`    | `"ok"`                           |
//! | POST   | `/pray/peekNote` | `{address, tx_hash}`     | `{note}`                         |
//! | POST   | `/pray/faucet`   | `{address}`              | `{success, tx_hash}`             |
//!
//! Successful responses are wrapped as `{"data": <payload>}`. Failures carry
//! `{"error": "<message>", "code": "<kind>"}` with a status per kind:
//!
//! | Kind                | Status |
//! |---------------------|--------|
//! | `bad_params`        | 400    |
//! | `bad_payment`       | 402    |
//! | `not_found`         | 404    |
//! | `validation_failed` | 422    |
//! | `too_many_requests` | 429    |
//! | `internal_error`    | 500    |
//!
//! A request that outlives the configured deadline gets a bare 408.
//! Token quantities are decimal strings of base units.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use pray_protocol::ledger::TxHash;
use pray_protocol::{Hub, HubError, KnockReceipt, Note, Step};

use crate::metrics::{NodeMetrics, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with the hub routes, CORS, tracing and
/// the per-request deadline.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/pray/knock", post(knock_handler))
        .route("/pray/reply", post(reply_handler))
        .route("/pray/peekNote", post(peek_note_handler))
        .route("/pray/faucet", post(faucet_handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct KnockRequest {
    pub address: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub id: String,
    pub note: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct PeekNoteRequest {
    pub address: String,
    pub tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct FaucetRequest {
    pub address: String,
}

/// Success envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KnockResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<String>,
    pub add_tokens: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
}

impl From<KnockReceipt> for KnockResponse {
    fn from(r: KnockReceipt) -> Self {
        Self {
            total_tokens: r.total_tokens.map(|t| t.to_string()),
            add_tokens: r.add_tokens.to_string(),
            note: r.note,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeekNoteResponse {
    pub note: Note,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub success: bool,
    pub tx_hash: String,
}

/// Error body returned on every failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(DataResponse { data })).into_response()
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can answer with instead of data.
#[derive(Debug)]
pub enum ApiError {
    /// The body is not JSON, or a required field is missing or blank.
    BadParams(String),
    /// The fields are present but do not hold acceptable values.
    ValidationFailed(String),
    BadPayment,
    NotFound(String),
    TooManyRequests,
    Internal,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadParams(_) => (StatusCode::BAD_REQUEST, "bad_params"),
            ApiError::ValidationFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
            ApiError::BadPayment => (StatusCode::PAYMENT_REQUIRED, "bad_payment"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "too_many_requests"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadParams(m) | ApiError::ValidationFailed(m) | ApiError::NotFound(m) => {
                m.clone()
            }
            ApiError::BadPayment => "payment not found".into(),
            ApiError::TooManyRequests => "too many requests".into(),
            ApiError::Internal => "internal error".into(),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::TooManyRequests => ApiError::TooManyRequests,
            HubError::BadPayment => ApiError::BadPayment,
            HubError::NoteNotFound(id) => ApiError::NotFound(format!("note not found: {id}")),
            HubError::InvalidInput(m) => ApiError::ValidationFailed(m),
            HubError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::BadParams(r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorResponse {
            error: self.message(),
            code: code.into(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadParams(format!("{field} is required")));
    }
    Ok(value)
}

fn parse_address(value: &str) -> Result<Address, ApiError> {
    let value = required("address", value)?;
    Address::from_str(value)
        .map_err(|_| ApiError::ValidationFailed(format!("invalid address: {value}")))
}

fn parse_tx_hash(value: &str) -> Result<TxHash, ApiError> {
    let value = required("tx_hash", value)?;
    TxHash::from_str(value)
        .map_err(|_| ApiError::ValidationFailed(format!("invalid transaction hash: {value}")))
}

/// Whole tokens in `amount`, for the minted-tokens counter.
fn whole_tokens(amount: U256, unit: U256) -> u64 {
    if unit.is_zero() {
        return 0;
    }
    u64::try_from(amount / unit).unwrap_or(u64::MAX)
}

/// Counts a refused or failed knock. Only a failure of the mint itself is
/// a mint failure; store trouble before it is not.
fn record_knock_failure(metrics: &NodeMetrics, e: &HubError) {
    match e {
        HubError::TooManyRequests => metrics.knocks_rate_limited_total.inc(),
        HubError::Internal(Step::Mint) => metrics.mint_failures_total.inc(),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness check. Does not touch the store or the ledger.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `POST /pray/knock`
async fn knock_handler(
    State(state): State<AppState>,
    body: Result<Json<KnockRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let address = parse_address(&req.address)?;

    match state.hub.knock(address, req.note.as_deref()).await {
        Ok(receipt) => {
            let m = &state.metrics;
            m.knocks_total.inc();
            m.tokens_minted_total.inc_by(whole_tokens(
                receipt.add_tokens,
                state.hub.config().token_unit,
            ));
            m.mint_latency_seconds
                .observe(receipt.mint_latency.as_secs_f64());
            if receipt.stored_note.is_some() {
                m.notes_stored_total.inc();
            }
            Ok(ok(KnockResponse::from(receipt)))
        }
        Err(e) => {
            record_knock_failure(&state.metrics, &e);
            Err(e.into())
        }
    }
}

/// `POST /pray/reply`
async fn reply_handler(
    State(state): State<AppState>,
    body: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let id = required("id", &req.id)?;
    let text = required("note", &req.note)?;
    let address = parse_address(&req.address)?;

    state.hub.reply(id, address, text).await?;
    Ok(ok("ok"))
}

/// `POST /pray/peekNote`
async fn peek_note_handler(
    State(state): State<AppState>,
    body: Result<Json<PeekNoteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let address = parse_address(&req.address)?;
    let tx = parse_tx_hash(&req.tx_hash)?;

    match state.hub.peek_note(address, tx).await {
        Ok(note) => {
            state.metrics.peeks_total.inc();
            Ok(ok(PeekNoteResponse { note }))
        }
        Err(e) => {
            if matches!(e, HubError::BadPayment) {
                state.metrics.bad_payments_total.inc();
            }
            Err(e.into())
        }
    }
}

/// `POST /pray/faucet`
async fn faucet_handler(
    State(state): State<AppState>,
    body: Result<Json<FaucetRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let address = parse_address(&req.address)?;

    let tx = state.hub.faucet(address).await?;
    state.metrics.faucet_transfers_total.inc();
    Ok(ok(FaucetResponse {
        success: true,
        tx_hash: tx.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pray_protocol::config::units;
    use pray_protocol::ledger::MemoryLedger;
    use pray_protocol::{HubConfig, MemoryStore, SequenceRandom};
    use tower::ServiceExt;

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    struct TestApp {
        router: Router,
        ledger: Arc<MemoryLedger>,
        metrics: SharedMetrics,
    }

    /// Router over an in-memory store and ledger. Every random draw is 0:
    /// boosted knocks mint the bottom of the range and sampling picks the
    /// first member.
    fn test_app() -> TestApp {
        let ledger = Arc::new(MemoryLedger::new(Address::repeat_byte(0x0b)));
        let hub = Arc::new(Hub::new(
            Arc::new(MemoryStore::new()),
            ledger.clone(),
            Arc::new(SequenceRandom::constant(0)),
            HubConfig::default(),
        ));
        let metrics = Arc::new(crate::metrics::NodeMetrics::new().unwrap());
        let state = AppState {
            hub,
            metrics: metrics.clone(),
        };
        TestApp {
            router: create_router(state, Duration::from_secs(30)),
            ledger,
            metrics,
        }
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        post_raw(router, path, serde_json::to_vec(&body).unwrap()).await
    }

    async fn post_raw(router: &Router, path: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        send(router, req).await
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    // -- Health -------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = test_app();
        let (status, json) = get(&app.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    // -- Knock --------------------------------------------------------------

    #[tokio::test]
    async fn knock_without_note_mints_one_token() {
        let app = test_app();
        let (status, json) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "address": ALICE })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["add_tokens"], "1000000000000000000");
        assert_eq!(json["data"]["total_tokens"], "1000000000000000000");
        assert!(json["data"].get("note").is_none());
        assert_eq!(app.metrics.knocks_total.get(), 1);
        assert_eq!(app.metrics.tokens_minted_total.get(), 1);
    }

    #[tokio::test]
    async fn knock_with_note_mints_boost_and_shares_notes() {
        let app = test_app();
        let (status, json) = post_json(
            &app.router,
            "/pray/knock",
            serde_json::json!({ "address": ALICE, "note": "hello" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["add_tokens"], units(5).to_string());
        assert_eq!(app.metrics.notes_stored_total.get(), 1);

        let (_, json) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "address": BOB })).await;
        let content = json["data"]["note"]["content"].as_str().unwrap();
        assert!(content.ends_with(": hello"));
    }

    #[tokio::test]
    async fn second_knock_within_cooldown_is_429() {
        let app = test_app();
        let body = serde_json::json!({ "address": ALICE });
        let (first, _) = post_json(&app.router, "/pray/knock", body.clone()).await;
        let (second, json) = post_json(&app.router, "/pray/knock", body).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["code"], "too_many_requests");
        assert_eq!(app.metrics.knocks_rate_limited_total.get(), 1);
    }

    #[tokio::test]
    async fn knock_without_address_is_bad_params() {
        let app = test_app();
        let (status, json) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "note": "hi" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "bad_params");

        let (status, _) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "address": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_params() {
        let app = test_app();
        let (status, json) = post_raw(&app.router, "/pray/knock", b"{not json".to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "bad_params");
    }

    #[tokio::test]
    async fn unparseable_address_fails_validation() {
        let app = test_app();
        let (status, json) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "address": "0x1234" }))
                .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "validation_failed");
    }

    #[tokio::test]
    async fn overlong_note_fails_validation() {
        let app = test_app();
        let (status, _) = post_json(
            &app.router,
            "/pray/knock",
            serde_json::json!({ "address": ALICE, "note": "x".repeat(513) }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(app.ledger.balance_of(&Address::repeat_byte(0xaa)), U256::ZERO);
    }

    #[tokio::test]
    async fn failed_mint_is_internal_error() {
        let app = test_app();
        app.ledger.fail_submissions(true);
        let (status, json) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "address": ALICE })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "internal_error");
        assert_eq!(app.metrics.mint_failures_total.get(), 1);
    }

    // -- Reply --------------------------------------------------------------

    #[tokio::test]
    async fn reply_to_stored_note() {
        let app = test_app();
        post_json(
            &app.router,
            "/pray/knock",
            serde_json::json!({ "address": ALICE, "note": "thread" }),
        )
        .await;
        let (_, json) =
            post_json(&app.router, "/pray/knock", serde_json::json!({ "address": BOB })).await;
        let id = json["data"]["note"]["id"].as_str().unwrap().to_string();

        let (status, json) = post_json(
            &app.router,
            "/pray/reply",
            serde_json::json!({ "id": id, "note": "me too", "address": BOB }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"], "ok");
    }

    #[tokio::test]
    async fn reply_to_unknown_note_is_404() {
        let app = test_app();
        let (status, json) = post_json(
            &app.router,
            "/pray/reply",
            serde_json::json!({ "id": "nope", "note": "hi", "address": BOB }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "not_found");
    }

    #[tokio::test]
    async fn reply_without_text_is_bad_params() {
        let app = test_app();
        let (status, _) = post_json(
            &app.router,
            "/pray/reply",
            serde_json::json!({ "id": "x", "note": "", "address": BOB }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // -- Peek ---------------------------------------------------------------

    #[tokio::test]
    async fn peek_with_burn_returns_note() {
        let app = test_app();
        post_json(
            &app.router,
            "/pray/knock",
            serde_json::json!({ "address": ALICE, "note": "secret" }),
        )
        .await;

        let bob = Address::repeat_byte(0xbb);
        app.ledger.credit(bob, units(10));
        let tx = app.ledger.burn(bob, units(10)).unwrap();

        let (status, json) = post_json(
            &app.router,
            "/pray/peekNote",
            serde_json::json!({ "address": BOB, "tx_hash": tx.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["note"]["content"]
            .as_str()
            .unwrap()
            .ends_with(": secret"));
        assert_eq!(app.metrics.peeks_total.get(), 1);
    }

    #[tokio::test]
    async fn peek_with_wrong_burn_is_402() {
        let app = test_app();
        let bob = Address::repeat_byte(0xbb);
        app.ledger.credit(bob, units(3));
        let tx = app.ledger.burn(bob, units(3)).unwrap();

        let (status, json) = post_json(
            &app.router,
            "/pray/peekNote",
            serde_json::json!({ "address": BOB, "tx_hash": tx.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["code"], "bad_payment");
        assert_eq!(app.metrics.bad_payments_total.get(), 1);
    }

    #[tokio::test]
    async fn peek_with_garbage_hash_fails_validation() {
        let app = test_app();
        let (status, _) = post_json(
            &app.router,
            "/pray/peekNote",
            serde_json::json!({ "address": BOB, "tx_hash": "0xnothex" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    // -- Faucet -------------------------------------------------------------

    #[tokio::test]
    async fn faucet_sends_half_a_coin() {
        let app = test_app();
        let (status, json) =
            post_json(&app.router, "/pray/faucet", serde_json::json!({ "address": BOB })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["success"], true);
        let tx_hash = json["data"]["tx_hash"].as_str().unwrap();
        assert!(tx_hash.starts_with("0x"));
        assert_eq!(tx_hash.len(), 66);
        assert_eq!(
            app.ledger.native_balance_of(&Address::repeat_byte(0xbb)),
            U256::from(500_000_000_000_000_000u64)
        );
        assert_eq!(app.metrics.faucet_transfers_total.get(), 1);
    }

    #[test]
    fn only_mint_step_counts_as_mint_failure() {
        let m = crate::metrics::NodeMetrics::new().unwrap();
        record_knock_failure(&m, &HubError::Internal(Step::RateLimit));
        record_knock_failure(&m, &HubError::Internal(Step::StoreNote));
        assert_eq!(m.mint_failures_total.get(), 0);

        record_knock_failure(&m, &HubError::Internal(Step::Mint));
        record_knock_failure(&m, &HubError::TooManyRequests);
        assert_eq!(m.mint_failures_total.get(), 1);
        assert_eq!(m.knocks_rate_limited_total.get(), 1);
    }

    #[test]
    fn whole_token_count_truncates() {
        assert_eq!(whole_tokens(units(7), units(1)), 7);
        assert_eq!(whole_tokens(units(1) - U256::from(1u8), units(1)), 0);
        assert_eq!(whole_tokens(units(1), U256::ZERO), 0);
    }
}
