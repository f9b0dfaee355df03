//! HTTP API
//! Mission: Tenant-scoped access to ledgers, consolidation and repair

use crate::api::tenant::TenantScope;
use crate::auth::models::{Claims, LoginRequest, LoginResponse, UserResponse};
use crate::auth::{auth_middleware, JwtHandler, UserStore};
use crate::consolidator::{ConsolidationError, Consolidator};
use crate::leagues::LeagueStore;
use crate::ledger::{
    EntryKey, LedgerError, LedgerSnapshot, LedgerStore, SeasonError, SeasonTransitionProcessor,
};
use crate::models::{
    classify_balance, BalanceClass, League, LeagueId, ParticipantId, Round, SeasonYear,
    Transaction, TransactionKind,
};
use crate::scoring::round_robin::StandingsRow;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerStore,
    pub leagues: Arc<LeagueStore>,
    pub users: Arc<UserStore>,
    pub jwt: Arc<JwtHandler>,
    pub consolidator: Consolidator,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/leagues", get(list_leagues).post(upsert_league))
        .route(
            "/api/leagues/:league/seasons/:season/ledger",
            get(get_league_ledger),
        )
        .route(
            "/api/leagues/:league/seasons/:season/ledger/:participant",
            get(get_participant_ledger),
        )
        .route(
            "/api/leagues/:league/seasons/:season/standings",
            get(get_standings),
        )
        .route(
            "/api/leagues/:league/seasons/:season/ledger/:participant/adjustments",
            post(post_adjustment),
        )
        .route(
            "/api/leagues/:league/seasons/:season/ledger/:participant/repair",
            post(repair_participant),
        )
        .route(
            "/api/leagues/:league/seasons/:season/rounds/:round/consolidate",
            post(consolidate_round),
        )
        .route(
            "/api/leagues/:league/seasons/:season/open",
            post(open_season),
        )
        .route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let valid = state.users.verify_password(&body.username, &body.password)?;
    if !valid {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let user = state
        .users
        .get_user_by_username(&body.username)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let (token, expires_in) = state.jwt.generate_token(&user)?;

    Ok(Json(LoginResponse {
        token,
        expires_in,
        role: user.role.clone(),
        user: UserResponse::from_user(&user),
    }))
}

/// Leagues visible to the caller's tenant scope
async fn list_leagues(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<League>>, ApiError> {
    let leagues = match TenantScope::from_claims(&claims) {
        TenantScope::All => state.leagues.list_all()?,
        TenantScope::Owned(owner) => state.leagues.list_owned(&owner)?,
    };
    Ok(Json(leagues))
}

async fn upsert_league(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(league): Json<League>,
) -> Result<StatusCode, ApiError> {
    if !TenantScope::from_claims(&claims).allows(&league) {
        return Err(ApiError::Forbidden(
            "League belongs to another administrator".to_string(),
        ));
    }
    state.leagues.upsert(&league)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_league_ledger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season)): Path<(String, u16)>,
) -> Result<Json<LeagueLedgerResponse>, ApiError> {
    let (league, season) = load_scoped_league(&state, &claims, &league, season)?;
    let entries = state.ledger.list_league(&league.id, season).await?;

    Ok(Json(LeagueLedgerResponse {
        league: league.id.clone(),
        season,
        entries: entries.iter().map(LedgerEntryResponse::from_snapshot).collect(),
    }))
}

async fn get_participant_ledger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season, participant)): Path<(String, u16, u64)>,
) -> Result<Json<LedgerEntryResponse>, ApiError> {
    let (league, season) = load_scoped_league(&state, &claims, &league, season)?;
    let key = EntryKey {
        league: league.id.clone(),
        season,
        participant: ParticipantId(participant),
    };

    let snapshot = state
        .ledger
        .read(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No ledger entry for {}", key)))?;

    Ok(Json(LedgerEntryResponse::from_snapshot(&snapshot)))
}

/// Round-robin standings through the league's most recent consolidated
/// round. Before anything has been consolidated there is nothing to stand
/// on, so the table is empty.
async fn get_standings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season)): Path<(String, u16)>,
) -> Result<Json<StandingsResponse>, ApiError> {
    let (league, season) = load_scoped_league(&state, &claims, &league, season)?;
    let entries = state.ledger.list_league(&league.id, season).await?;
    let through = entries
        .iter()
        .map(|e| e.last_consolidated_round)
        .max()
        .filter(|r| !r.is_season_marker());

    let rows = match through {
        Some(through) => state.consolidator.standings(&league, through).await?,
        None => Vec::new(),
    };

    Ok(Json(StandingsResponse {
        league: league.id.clone(),
        season,
        through,
        rows,
    }))
}

async fn post_adjustment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season, participant)): Path<(String, u16, u64)>,
    Json(body): Json<AdjustmentRequest>,
) -> Result<Json<LedgerEntryResponse>, ApiError> {
    let (league, season) = load_scoped_league(&state, &claims, &league, season)?;

    if !matches!(
        body.kind,
        TransactionKind::ManualAdjustment | TransactionKind::Settlement
    ) {
        return Err(ApiError::BadRequest(format!(
            "Adjustments must be manual_adjustment or settlement, got {}",
            body.kind.as_str()
        )));
    }
    let round = Round::parse(body.round)
        .ok_or_else(|| ApiError::BadRequest(format!("Round {} out of range", body.round)))?;

    let key = EntryKey {
        league: league.id.clone(),
        season,
        participant: ParticipantId(participant),
    };
    let snapshot = state
        .ledger
        .append_adjustment(
            &key,
            Transaction::new(round, body.kind, body.value, body.description),
        )
        .await?;

    Ok(Json(LedgerEntryResponse::from_snapshot(&snapshot)))
}

async fn repair_participant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season, participant)): Path<(String, u16, u64)>,
    Json(body): Json<RepairRequest>,
) -> Result<Json<LedgerEntryResponse>, ApiError> {
    let (league, _season) = load_scoped_league(&state, &claims, &league, season)?;

    let through = Round::parse(body.through_round)
        .filter(|r| !r.is_season_marker())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Round {} out of range", body.through_round))
        })?;

    let snapshot = state
        .consolidator
        .repair_participant(&league, ParticipantId(participant), through)
        .await?;

    Ok(Json(LedgerEntryResponse::from_snapshot(&snapshot)))
}

async fn consolidate_round(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season, round)): Path<(String, u16, u8)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (league, _season) = load_scoped_league(&state, &claims, &league, season)?;
    let round = Round::parse(round)
        .filter(|r| !r.is_season_marker())
        .ok_or_else(|| ApiError::BadRequest(format!("Round {} out of range", round)))?;

    let report = state
        .consolidator
        .consolidate_league_round(&league, round)
        .await?;

    Ok(Json(json!({
        "round": report.round,
        "succeeded": report.succeeded,
        "failed": report.failed,
        "complete": report.is_complete(),
    })))
}

async fn open_season(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((league, season)): Path<(String, u16)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (league, season) = load_scoped_league(&state, &claims, &league, season)?;

    // One participant's failure never aborts the batch: each outcome is
    // reported and a blocked participant can be retried alone after the
    // debt is settled.
    let processor = SeasonTransitionProcessor::new(&state.ledger);
    let mut outcomes = Vec::new();
    let mut failed = 0usize;
    for (participant, result) in processor.open_league_season(&league).await {
        match result {
            Ok(outcome) => outcomes.push(json!({
                "participant": participant,
                "outcome": format!("{:?}", outcome),
            })),
            Err(e) => {
                failed += 1;
                outcomes.push(json!({
                    "participant": participant,
                    "error": e.to_string(),
                }));
            }
        }
    }

    Ok(Json(json!({
        "league": league.id,
        "season": season,
        "participants": outcomes,
        "failed": failed,
        "complete": failed == 0,
    })))
}

/// Parses the path identifiers, loads the league and enforces the tenant
/// boundary. A crafted league id cannot skip the filter: the owner check
/// runs against the stored league, not the request.
fn load_scoped_league(
    state: &AppState,
    claims: &Claims,
    league: &str,
    season: u16,
) -> Result<(League, SeasonYear), ApiError> {
    let id = LeagueId::parse(league)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid league id: {}", league)))?;
    let season = SeasonYear(season);

    let league = state
        .leagues
        .get(&id, season)?
        .ok_or_else(|| ApiError::NotFound(format!("League {} season {} not found", id, season)))?;

    if !TenantScope::from_claims(claims).allows(&league) {
        return Err(ApiError::Forbidden(
            "League belongs to another administrator".to_string(),
        ));
    }

    Ok((league, season))
}

// ===== Request/Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Deserialize)]
struct AdjustmentRequest {
    round: u8,
    kind: TransactionKind,
    value: f64,
    description: String,
}

#[derive(Deserialize)]
struct RepairRequest {
    through_round: u8,
}

#[derive(Serialize)]
struct StandingsResponse {
    league: LeagueId,
    season: SeasonYear,
    /// Last consolidated round the table reflects; absent when nothing has
    /// been consolidated yet.
    through: Option<Round>,
    rows: Vec<StandingsRow>,
}

#[derive(Serialize)]
struct LeagueLedgerResponse {
    league: LeagueId,
    season: SeasonYear,
    entries: Vec<LedgerEntryResponse>,
}

#[derive(Serialize)]
struct LedgerEntryResponse {
    participant: ParticipantId,
    balance: f64,
    gains: f64,
    losses: f64,
    class: BalanceClass,
    last_consolidated_round: Round,
    transactions: Vec<Transaction>,
}

impl LedgerEntryResponse {
    fn from_snapshot(snapshot: &LedgerSnapshot) -> Self {
        Self {
            participant: snapshot.key.participant,
            balance: snapshot.balance,
            gains: snapshot.gains,
            losses: snapshot.losses,
            class: classify_balance(snapshot.balance),
            last_consolidated_round: snapshot.last_consolidated_round,
            transactions: snapshot.transactions.clone(),
        }
    }
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Internal(anyhow::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Upstream(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidRound(round) => {
                ApiError::BadRequest(format!("Invalid round {}", round))
            }
            LedgerError::KindNotAllowed(kind) => {
                ApiError::BadRequest(format!("Transaction kind {} not allowed", kind))
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<ConsolidationError> for ApiError {
    fn from(err: ConsolidationError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<SeasonError> for ApiError {
    fn from(err: SeasonError) -> Self {
        match err {
            SeasonError::NegativeBalanceBlocked { .. } => ApiError::Conflict(err.to_string()),
            SeasonError::Ledger(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
