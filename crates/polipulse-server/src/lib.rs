use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use polipulse_api::auth::{self, AppState};
use polipulse_api::middleware::require_auth;
use polipulse_api::{audit, compliance, conversations, directory, messages};
use polipulse_gateway::connection;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("POLIPULSE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("POLIPULSE_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = lookup("POLIPULSE_DB_PATH").unwrap_or_else(|| "polipulse.db".into());
        let host = lookup("POLIPULSE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("POLIPULSE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("POLIPULSE_PORT must be a port number")?;
        let token_ttl_days: i64 = lookup("POLIPULSE_TOKEN_TTL_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("POLIPULSE_TOKEN_TTL_DAYS must be a whole number of days")?;
        if token_ttl_days <= 0 {
            bail!("POLIPULSE_TOKEN_TTL_DAYS must be positive");
        }

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(db_path),
            addr,
            token_ttl_days,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/pacs", post(directory::create_pac_handler))
        .route("/pacs/{pac_id}/campaigns", post(directory::create_campaign_handler))
        .route("/influencers", post(directory::register_influencer_handler))
        .route(
            "/conversations",
            get(conversations::list_handler).post(conversations::resolve_handler),
        )
        .route("/conversations/{conversation_id}/messages", get(conversations::messages_handler))
        .route("/conversations/{conversation_id}/read", post(conversations::read_all_handler))
        .route("/messages", post(messages::send_handler))
        .route("/messages/{message_id}/read", post(messages::read_handler))
        .route("/campaigns/{campaign_id}/submissions", post(compliance::create_handler))
        .route("/submissions/{submission_id}/approve", post(compliance::approve_handler))
        .route("/submissions/{submission_id}/revision", post(compliance::revision_handler))
        .route("/submissions/{submission_id}/resubmit", post(compliance::resubmit_handler))
        .route("/compliance/stats", get(compliance::stats_handler))
        .route("/compliance/queue", get(compliance::queue_handler))
        .route("/compliance/report", get(compliance::report_handler))
        .route("/compliance/audit", get(audit::audit_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, jwt_secret))
}
