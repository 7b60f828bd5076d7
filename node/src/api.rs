//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor, and
//! every mutating endpoint funnels through the surety pool behind a single
//! write lock — the lock is what serializes the operation stream.
//!
//! ## Endpoints
//!
//! | Method | Path                                  | Description                       |
//! |--------|---------------------------------------|-----------------------------------|
//! | GET    | `/health`                             | Liveness probe                    |
//! | GET    | `/status`                             | Node + pool status summary        |
//! | GET    | `/operational`                        | Operational flag                  |
//! | POST   | `/operational`                        | Pause/resume (owner only)         |
//! | POST   | `/callers`                            | Authorize an oracle caller        |
//! | DELETE | `/callers/:address`                   | Deauthorize an oracle caller      |
//! | POST   | `/airlines`                           | Propose an airline                |
//! | GET    | `/airlines/:address`                  | Airline record                    |
//! | POST   | `/airlines/:address/votes`            | Vote to admit a pending airline   |
//! | POST   | `/airlines/:address/funding`          | Deposit airline funding           |
//! | POST   | `/flights`                            | Register a flight                 |
//! | GET    | `/flights/:key`                       | Flight record                     |
//! | POST   | `/flights/:key/status`                | Oracle resolution (allow-listed)  |
//! | POST   | `/flights/:key/insurance`             | Buy a policy                      |
//! | GET    | `/flights/:key/insurance/:passenger`  | Policy record                     |
//! | GET    | `/passengers/:address/credit`         | Withdrawable credit               |
//! | POST   | `/passengers/:address/withdraw`       | Withdraw the full credit balance  |
//! | GET    | `/payouts`                            | Payout receipt journal            |
//! | GET    | `/ws`                                 | WebSocket for live pool events    |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use skybond_contracts::pool::AccessError;
use skybond_contracts::{EscrowError, GovernanceError, SuretyPool};
use skybond_protocol::flight::{FlightKey, FlightStatus};
use skybond_protocol::identity::Address;
use skybond_protocol::storage::SuretyDb;

use crate::metrics::SharedMetrics;
use crate::treasury::ReceiptTreasury;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet", "testnet", "mainnet").
    pub network: String,
    /// The surety pool. The write lock serializes every mutation.
    pub pool: Arc<RwLock<SuretyPool>>,
    /// Persistent storage: state snapshots and the payout journal.
    pub db: Arc<SuretyDb>,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<PoolEvent>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PoolEvent {
    /// An airline was proposed or admitted.
    #[serde(rename = "airline_registered")]
    AirlineRegistered { airline: String, pending: bool },
    /// An airline crossed the funding threshold.
    #[serde(rename = "airline_funded")]
    AirlineFunded { airline: String, amount: u64 },
    /// A flight was registered.
    #[serde(rename = "flight_registered")]
    FlightRegistered {
        key: String,
        airline: String,
        code: String,
    },
    /// A policy was sold.
    #[serde(rename = "policy_sold")]
    PolicySold {
        key: String,
        passenger: String,
        premium: u64,
    },
    /// The oracle resolved a flight.
    #[serde(rename = "flight_resolved")]
    FlightResolved { key: String, status: String },
    /// A passenger withdrawal was released.
    #[serde(rename = "payout_released")]
    PayoutReleased { passenger: String, amount: u64 },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/operational", get(get_operational_handler))
        .route("/operational", post(set_operational_handler))
        .route("/callers", post(authorize_caller_handler))
        .route("/callers/:address", delete(deauthorize_caller_handler))
        .route("/airlines", post(register_airline_handler))
        .route("/airlines/:address", get(airline_handler))
        .route("/airlines/:address/votes", post(vote_handler))
        .route("/airlines/:address/funding", post(fund_airline_handler))
        .route("/flights", post(register_flight_handler))
        .route("/flights/:key", get(flight_handler))
        .route("/flights/:key/status", post(process_status_handler))
        .route("/flights/:key/insurance", post(buy_insurance_handler))
        .route(
            "/flights/:key/insurance/:passenger",
            get(policy_handler),
        )
        .route("/passengers/:address/credit", get(credit_handler))
        .route("/passengers/:address/withdraw", post(withdraw_handler))
        .route("/payouts", get(payouts_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network identifier.
    pub network: String,
    /// Whether mutating operations are enabled.
    pub operational: bool,
    /// Total airline records, in any status.
    pub airlines: u64,
    /// Airlines past the funding threshold.
    pub funded_airlines: u64,
    /// Registered flights.
    pub flights: u64,
    /// Policies sold.
    pub policies: u64,
    /// Plumes held in custody.
    pub pool_balance: u64,
    /// Plumes owed to passengers.
    pub credits_outstanding: u64,
    /// Withdrawals released so far.
    pub payouts: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Body for `POST /operational`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetOperationalRequest {
    /// Desired flag value.
    pub operational: bool,
    /// The identity making the request (must be the owner).
    pub caller: String,
}

/// Body for `POST /callers` and `DELETE /callers/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallerRequest {
    /// The identity to (de)authorize. Ignored on DELETE, where the path
    /// carries it.
    #[serde(default)]
    pub identity: Option<String>,
    /// The identity making the request (must be the owner).
    pub caller: String,
}

/// Body for `POST /airlines`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterAirlineRequest {
    /// The airline being proposed.
    pub candidate: String,
    /// The funded airline proposing it.
    pub sponsor: String,
}

/// Body for `POST /airlines/:address/votes`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VoteRequest {
    /// The funded airline casting the vote.
    pub voter: String,
}

/// Body for `POST /airlines/:address/funding`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FundingRequest {
    /// Deposit amount, in plumes.
    pub amount: u64,
}

/// Response payload for `GET /airlines/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AirlineResponse {
    /// Bech32 address.
    pub address: String,
    /// Admission status.
    pub status: String,
    /// The sponsor that proposed this airline.
    pub sponsor: String,
    /// Votes cast while pending (sponsor included).
    pub votes: Vec<String>,
    /// Funding deposited, in plumes.
    pub funded_amount: u64,
}

/// Body for `POST /flights`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterFlightRequest {
    /// The operating (funded) airline.
    pub airline: String,
    /// Carrier flight code.
    pub code: String,
    /// Scheduled departure, unix seconds.
    pub departure: i64,
}

/// Response payload for flight registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct FlightKeyResponse {
    /// The derived flight key (hex).
    pub key: String,
}

/// Response payload for `GET /flights/:key`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FlightResponse {
    /// The flight key (hex).
    pub key: String,
    /// The operating airline.
    pub airline: String,
    /// Carrier flight code.
    pub code: String,
    /// Scheduled departure, unix seconds.
    pub departure: i64,
    /// Oracle status name.
    pub status: String,
    /// Oracle status wire code.
    pub status_code: u8,
}

/// Body for `POST /flights/:key/status` — the oracle-resolution path.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessStatusRequest {
    /// Resolved status wire code (0, 10, 20, 30, 40, 50).
    pub status_code: u8,
    /// The allow-listed service delivering the resolution.
    pub caller: String,
}

/// Body for `POST /flights/:key/insurance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuyInsuranceRequest {
    /// The passenger buying cover.
    pub passenger: String,
    /// Premium, in plumes (positive, capped).
    pub amount: u64,
}

/// Response payload for `GET /flights/:key/insurance/:passenger`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyResponse {
    /// The insured passenger.
    pub passenger: String,
    /// Premium paid, in plumes.
    pub premium: u64,
    /// Whether the 1.5× credit has been issued.
    pub credited: bool,
}

/// Response payload for `GET /passengers/:address/credit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditResponse {
    /// The passenger.
    pub passenger: String,
    /// Withdrawable plumes.
    pub credit: u64,
}

/// Response payload for `POST /passengers/:address/withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    /// The passenger.
    pub passenger: String,
    /// Plumes released.
    pub amount: u64,
}

/// One entry of `GET /payouts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PayoutResponse {
    /// Receipt identifier.
    pub id: String,
    /// The passenger paid.
    pub passenger: String,
    /// Plumes released.
    pub amount: u64,
    /// ISO-8601 release time.
    pub released_at: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn access_status(err: &AccessError) -> StatusCode {
    match err {
        AccessError::Paused => StatusCode::SERVICE_UNAVAILABLE,
        AccessError::NotOwner { .. } | AccessError::UnauthorizedCaller { .. } => {
            StatusCode::FORBIDDEN
        }
    }
}

fn governance_error(err: GovernanceError) -> ApiError {
    let status = match &err {
        GovernanceError::Access(access) => access_status(access),
        GovernanceError::UnknownCandidate { .. } => StatusCode::NOT_FOUND,
        GovernanceError::AlreadyRegistered { .. }
        | GovernanceError::AlreadyFunded { .. }
        | GovernanceError::DuplicateVote { .. } => StatusCode::CONFLICT,
        GovernanceError::NotFunded { .. }
        | GovernanceError::ConsensusPending { .. }
        | GovernanceError::InsufficientFunding { .. }
        | GovernanceError::AmountOverflow => StatusCode::BAD_REQUEST,
    };
    api_error(status, err.to_string())
}

fn escrow_error(err: EscrowError) -> ApiError {
    let status = match &err {
        EscrowError::Access(access) => access_status(access),
        EscrowError::AirlineNotFound { .. }
        | EscrowError::FlightNotFound { .. }
        | EscrowError::NoCredit { .. } => StatusCode::NOT_FOUND,
        EscrowError::DuplicateFlight { .. }
        | EscrowError::DuplicatePolicy { .. }
        | EscrowError::AlreadyProcessed { .. }
        | EscrowError::PoolDepleted { .. } => StatusCode::CONFLICT,
        EscrowError::AirlineNotFunded { .. }
        | EscrowError::ZeroPremium
        | EscrowError::PremiumExceedsCap { .. }
        | EscrowError::AmountOverflow => StatusCode::BAD_REQUEST,
        EscrowError::Release(_) => StatusCode::BAD_GATEWAY,
    };
    api_error(status, err.to_string())
}

fn parse_address(s: &str) -> Result<Address, ApiError> {
    s.parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid address: {e}")))
}

fn parse_flight_key(s: &str) -> Result<FlightKey, ApiError> {
    s.parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid flight key: {e}")))
}

/// Snapshot the pool to disk after a successful mutation.
///
/// The in-memory state is authoritative; a failed snapshot is logged and the
/// next successful mutation re-persists everything.
fn persist(state: &AppState, pool: &SuretyPool) {
    if let Err(e) = state.db.persist_state(pool.state()) {
        tracing::error!("failed to persist state snapshot: {}", e);
    }
    state.metrics.observe_pool(pool);
}

// ---------------------------------------------------------------------------
// Handlers — status and access gate
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.). It
/// intentionally does not check pool health — that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node and pool status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.pool.read().await;
    let resp = StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        operational: pool.is_operational(),
        airlines: pool.state().airline_count() as u64,
        funded_airlines: pool.state().funded_airline_count() as u64,
        flights: pool.state().flight_count() as u64,
        policies: pool.state().policy_count() as u64,
        pool_balance: pool.state().pool_balance(),
        credits_outstanding: pool.state().total_outstanding_credit(),
        payouts: state.db.payout_count() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /operational` — just the flag.
async fn get_operational_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.pool.read().await;
    Json(serde_json::json!({ "operational": pool.is_operational() }))
}

/// `POST /operational` — pause or resume the system. Owner only.
async fn set_operational_handler(
    State(state): State<AppState>,
    Json(req): Json<SetOperationalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = parse_address(&req.caller)?;
    let mut pool = state.pool.write().await;
    pool.set_operating_status(req.operational, &caller)
        .map_err(|e| api_error(access_status(&e), e.to_string()))?;
    persist(&state, &pool);
    Ok(Json(
        serde_json::json!({ "operational": pool.is_operational() }),
    ))
}

/// `POST /callers` — authorize an oracle-resolution caller. Owner only.
async fn authorize_caller_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = req
        .identity
        .as_deref()
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing identity"))?;
    let identity = parse_address(identity)?;
    let caller = parse_address(&req.caller)?;

    let mut pool = state.pool.write().await;
    pool.authorize_caller(identity, &caller)
        .map_err(|e| api_error(access_status(&e), e.to_string()))?;
    persist(&state, &pool);
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /callers/:address` — deauthorize a caller. Owner only.
async fn deauthorize_caller_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = parse_address(&address)?;
    let caller = parse_address(&req.caller)?;

    let mut pool = state.pool.write().await;
    pool.deauthorize_caller(&identity, &caller)
        .map_err(|e| api_error(access_status(&e), e.to_string()))?;
    persist(&state, &pool);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Handlers — governance
// ---------------------------------------------------------------------------

/// `POST /airlines` — propose an airline for admission.
async fn register_airline_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterAirlineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate = parse_address(&req.candidate)?;
    let sponsor = parse_address(&req.sponsor)?;

    let mut pool = state.pool.write().await;
    pool.register_airline(candidate, &sponsor)
        .map_err(governance_error)?;
    let pending = !pool.is_airline_registered(&candidate);
    persist(&state, &pool);

    state.metrics.airlines_registered_total.inc();
    let _ = state.event_tx.send(PoolEvent::AirlineRegistered {
        airline: req.candidate.clone(),
        pending,
    });
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "pending": pending })),
    ))
}

/// `GET /airlines/:address` — airline record.
async fn airline_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let airline = parse_address(&address)?;
    let pool = state.pool.read().await;
    let record = pool
        .state()
        .airline(&airline)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown airline {address}")))?;

    Ok(Json(AirlineResponse {
        address,
        status: record.status.to_string(),
        sponsor: record.sponsor.to_string(),
        votes: record.votes.iter().map(|v| v.to_string()).collect(),
        funded_amount: record.funded_amount,
    }))
}

/// `POST /airlines/:address/votes` — vote to admit a pending airline.
async fn vote_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate = parse_address(&address)?;
    let voter = parse_address(&req.voter)?;

    let mut pool = state.pool.write().await;
    pool.vote_to_register_airline(&candidate, &voter)
        .map_err(governance_error)?;
    let registered = pool.is_airline_registered(&candidate);
    persist(&state, &pool);

    if registered {
        let _ = state.event_tx.send(PoolEvent::AirlineRegistered {
            airline: address,
            pending: false,
        });
    }
    Ok(Json(serde_json::json!({ "registered": registered })))
}

/// `POST /airlines/:address/funding` — deposit airline funding.
async fn fund_airline_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<FundingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let airline = parse_address(&address)?;

    let mut pool = state.pool.write().await;
    pool.fund_airline(&airline, req.amount)
        .map_err(governance_error)?;
    persist(&state, &pool);

    state.metrics.airlines_funded_total.inc();
    let _ = state.event_tx.send(PoolEvent::AirlineFunded {
        airline: address,
        amount: req.amount,
    });
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Handlers — escrow
// ---------------------------------------------------------------------------

/// `POST /flights` — register a flight for a funded airline.
async fn register_flight_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterFlightRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let airline = parse_address(&req.airline)?;

    let mut pool = state.pool.write().await;
    let key = pool
        .register_flight(&airline, &req.code, req.departure)
        .map_err(escrow_error)?;
    persist(&state, &pool);

    state.metrics.flights_registered_total.inc();
    let _ = state.event_tx.send(PoolEvent::FlightRegistered {
        key: key.to_hex(),
        airline: req.airline.clone(),
        code: req.code.clone(),
    });
    Ok((
        StatusCode::CREATED,
        Json(FlightKeyResponse { key: key.to_hex() }),
    ))
}

/// `GET /flights/:key` — flight record.
async fn flight_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let flight_key = parse_flight_key(&key)?;
    let pool = state.pool.read().await;
    let flight = pool
        .flight(&flight_key)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("flight {key} not found")))?;

    Ok(Json(FlightResponse {
        key,
        airline: flight.airline.to_string(),
        code: flight.code.clone(),
        departure: flight.departure,
        status: flight.status.to_string(),
        status_code: flight.status.code(),
    }))
}

/// `POST /flights/:key/status` — apply the oracle's resolution.
async fn process_status_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ProcessStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flight_key = parse_flight_key(&key)?;
    let caller = parse_address(&req.caller)?;
    let status = FlightStatus::from_code(req.status_code)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let mut pool = state.pool.write().await;
    pool.process_flight_status(&flight_key, status, &caller)
        .map_err(escrow_error)?;
    persist(&state, &pool);

    if status.is_resolved() {
        state.metrics.flights_resolved_total.inc();
        let _ = state.event_tx.send(PoolEvent::FlightResolved {
            key,
            status: status.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /flights/:key/insurance` — buy a policy on a flight.
async fn buy_insurance_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<BuyInsuranceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flight_key = parse_flight_key(&key)?;
    let passenger = parse_address(&req.passenger)?;

    let mut pool = state.pool.write().await;
    pool.buy_insurance(&flight_key, passenger, req.amount)
        .map_err(escrow_error)?;
    persist(&state, &pool);

    state.metrics.policies_sold_total.inc();
    let _ = state.event_tx.send(PoolEvent::PolicySold {
        key,
        passenger: req.passenger.clone(),
        premium: req.amount,
    });
    Ok(StatusCode::CREATED)
}

/// `GET /flights/:key/insurance/:passenger` — policy record.
async fn policy_handler(
    Path((key, passenger)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let flight_key = parse_flight_key(&key)?;
    let passenger_addr = parse_address(&passenger)?;

    let pool = state.pool.read().await;
    let policy = pool.policy(&flight_key, &passenger_addr).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("no policy for {passenger} on flight {key}"),
        )
    })?;

    Ok(Json(PolicyResponse {
        passenger,
        premium: policy.premium,
        credited: policy.credited,
    }))
}

/// `GET /passengers/:address/credit` — withdrawable credit balance.
///
/// Returns zero for passengers that were never credited — a missing balance
/// is not an error, it's just an empty one.
async fn credit_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let passenger = parse_address(&address)?;
    let pool = state.pool.read().await;
    Ok(Json(CreditResponse {
        passenger: address,
        credit: pool.passenger_credit(&passenger),
    }))
}

/// `POST /passengers/:address/withdraw` — withdraw the full credit balance.
async fn withdraw_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let passenger = parse_address(&address)?;

    let mut pool = state.pool.write().await;
    let mut treasury = ReceiptTreasury::new(Arc::clone(&state.db));
    let amount = pool.pay(&passenger, &mut treasury).map_err(escrow_error)?;
    persist(&state, &pool);

    state.metrics.payouts_released_total.inc();
    let _ = state.event_tx.send(PoolEvent::PayoutReleased {
        passenger: address.clone(),
        amount,
    });
    Ok(Json(WithdrawResponse {
        passenger: address,
        amount,
    }))
}

/// `GET /payouts` — the payout receipt journal.
async fn payouts_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let receipts = state
        .db
        .payouts()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let body: Vec<PayoutResponse> = receipts
        .into_iter()
        .map(|r| PayoutResponse {
            id: r.id.to_string(),
            passenger: r.passenger.to_string(),
            amount: r.amount,
            released_at: r.released_at.to_rfc3339(),
        })
        .collect();
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`PoolEvent`] messages. The connection is
/// read-only from the server's perspective; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events until
/// the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            // Client disconnected.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Client messages are ignored — this is a push-only channel.
                    }
                    _ => break, // Disconnected or error.
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
