//! HTTP server for the HTML pages and the JSON API.

pub mod api;
pub mod extract;
pub mod forms;
pub mod pages;
pub mod templates;

use crate::config::ServerConfig;
use crate::db::Database;
use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Task pages
        .route("/", get(pages::home))
        .route("/tasks", get(pages::pending_tasks))
        .route("/completed_tasks", get(pages::completed_tasks))
        .route("/all_tasks", get(pages::all_tasks))
        .route(
            "/create-task",
            get(pages::create_task_page).post(pages::create_task_submit),
        )
        .route(
            "/update-task/{id}",
            get(pages::update_task_page).post(pages::update_task_submit),
        )
        .route("/detail-task/{id}", get(pages::task_detail_page))
        .route(
            "/delete-task/{id}",
            get(pages::delete_task_page).post(pages::delete_task_submit),
        )
        .route(
            "/complete_task/{id}",
            get(pages::complete_task_page).post(pages::complete_task_submit),
        )
        // Account pages
        .route(
            "/user/signup",
            get(pages::signup_page).post(pages::signup_submit),
        )
        .route(
            "/user/login",
            get(pages::login_page).post(pages::login_submit),
        )
        .route("/user/logout", get(pages::logout).post(pages::logout))
        .route(
            "/update-email-pref/{user_id}",
            get(pages::email_preferences_page).post(pages::email_preferences_submit),
        )
        .route("/about", get(pages::about_page))
        // JSON API
        .route("/api/health", get(api::health))
        .route("/auth-token/", post(api::obtain_token))
        .route("/api/task/", get(api::list_tasks).post(api::create_task))
        .route(
            "/api/task/{id}/",
            get(api::get_task)
                .put(api::replace_task)
                .patch(api::patch_task)
                .delete(api::delete_task),
        )
        .route("/api/task/history/{id}/", get(api::task_history))
        .route("/taskapi/", get(api::all_open_tasks))
        .fallback(pages::not_found)
        .layer(from_fn(extract::stamp_request_time))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server in the background.
///
/// Returns a shutdown sender and the bound address. Port 0 picks a free port.
pub async fn start_server(
    db: Arc<Database>,
    config: Arc<ServerConfig>,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let addr = format!("{}:{}", config.bind, config.port);
    let app = build_router(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Task manager listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Server shutting down");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
