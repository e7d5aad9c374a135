use std::sync::Arc;

use agora_shared::UserId;
use agora_store::SharedDatabase;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::ClientAgent;
use crate::auth;
use crate::config::ServerConfig;
use crate::connection;
use crate::hub::Hub;
use crate::store::ChatStore;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    /// Used by the admission gate for session and user lookups.
    pub db: SharedDatabase,
    /// Message store handed to every agent.
    pub store: Arc<dyn ChatStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: SharedDatabase, config: ServerConfig) -> Self {
        let store: Arc<dyn ChatStore> = Arc::new(db.clone());
        Self {
            hub: Arc::new(Hub::with_store(Arc::clone(&store))),
            store,
            db,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/online", get(online_users))
        .route("/ws", get(chat_socket))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct OnlineResponse {
    users: Vec<UserId>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn online_users(State(state): State<AppState>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        users: state.hub.online_users().await,
    })
}

/// Authenticate, then upgrade and hand the socket to a new client agent.
///
/// The session is checked before the upgrade is validated so that an
/// unauthenticated client always sees 401.
async fn chat_socket(
    State(state): State<AppState>,
    jar: CookieJar,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user = match auth::authenticate(&jar, &state.config.session_cookie, &state.db).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let connection_limits = state.config.connection_limits();
    let agent = ClientAgent::new(
        user.user_id,
        user.username,
        Arc::clone(&state.hub),
        Arc::clone(&state.store),
        state.config.agent_limits(),
    );

    info!(user_id = %user.user_id, "Upgrading chat connection");
    ws.max_message_size(state.config.max_frame_size)
        .max_frame_size(state.config.max_frame_size)
        .on_upgrade(move |socket| async move {
            let (reader, writer) = connection::from_websocket(socket, connection_limits);
            agent.run(reader, writer).await;
        })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
