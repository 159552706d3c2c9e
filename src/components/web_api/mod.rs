mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use super::free_slots::FreeSlotFinder;
use super::live::LiveHub;
use super::store::Store;
use super::Services;
use crate::config::{component_names, Config};
use crate::error::{component_error, AppResult, Error};
use handlers::{
    complete_todo_handler, create_event_handler, create_todo_handler,
    delete_calendar_events_handler, delete_event_handler, free_slots_handler,
    get_working_hours_handler, health_handler, list_notifications_handler, live_handler,
    mark_notification_read_handler, put_working_hours_handler,
};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub live: Arc<LiveHub>,
    pub finder: FreeSlotFinder,
}

impl AppState {
    pub fn new(config: &Config, services: &Services) -> Self {
        Self {
            store: Arc::clone(&services.store),
            live: Arc::clone(&services.live),
            finder: FreeSlotFinder::new(Arc::clone(&services.store), config),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/users/{user_id}/free-slots", get(free_slots_handler))
        .route(
            "/api/users/{user_id}/working-hours",
            get(get_working_hours_handler).put(put_working_hours_handler),
        )
        .route("/api/users/{user_id}/events", post(create_event_handler))
        .route("/api/events/{event_id}", delete(delete_event_handler))
        .route(
            "/api/calendars/{calendar_id}/events",
            delete(delete_calendar_events_handler),
        )
        .route("/api/users/{user_id}/todos", post(create_todo_handler))
        .route("/api/todos/{todo_id}/complete", post(complete_todo_handler))
        .route(
            "/api/users/{user_id}/notifications",
            get(list_notifications_handler),
        )
        .route(
            "/api/notifications/{notification_id}/read",
            post(mark_notification_read_handler),
        )
        .route("/api/users/{user_id}/live", get(live_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A running HTTP server
struct Server {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    addr: SocketAddr,
}

/// Web API component: serves the HTTP API
#[derive(Default)]
pub struct WebApi {
    server: Mutex<Option<Server>>,
}

impl WebApi {
    /// Create a new Web API component
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the server is listening on, once started
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|server| server.addr)
    }
}

#[async_trait::async_trait]
impl super::Component for WebApi {
    fn name(&self) -> &'static str {
        component_names::WEB_API
    }

    async fn init(&self, config: Arc<RwLock<Config>>, services: Services) -> AppResult<()> {
        let mut server_lock = self.server.lock().await;
        if server_lock.is_some() {
            return Ok(());
        }

        let (bind, state) = {
            let config_read = config.read().await;
            (
                format!("{}:{}", config_read.bind_addr, config_read.port),
                AppState::new(&config_read, &services),
            )
        };

        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| component_error(&format!("Failed to bind {}: {}", bind, e)))?;
        let addr = listener.local_addr()?;
        info!("Listening on {}", addr);

        let app = router(state);
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone().cancelled_owned();

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
            info!("HTTP server stopped");
        });

        *server_lock = Some(Server { cancel, task, addr });
        Ok(())
    }

    async fn shutdown(&self) -> AppResult<()> {
        let server = self.server.lock().await.take();
        if let Some(Server { cancel, task, .. }) = server {
            cancel.cancel();
            task.await
                .map_err(|e| component_error(&format!("HTTP server task failed: {}", e)))?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
