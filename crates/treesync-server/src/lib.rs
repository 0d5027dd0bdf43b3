//! HTTP surface of the treesync file-synchronization server.
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`;
//! the token is both the credential and the device identity used for the
//! single-writer session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use treesync_core::{AccessControl, SessionLock, SharedClock, SyncGateway, SyncWatermark};
use treesync_local::LocalFileOperations;

pub mod auth;
pub mod config;
pub mod error;
pub mod fault;
pub mod handlers;
pub mod upload;

use fault::{panic_recorder, record_faults, FaultLog};

/// Resolved runtime settings, independent of how they were supplied.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub root: PathBuf,
    pub staging_dir: PathBuf,
    pub session_timeout: Duration,
    pub fault_log: PathBuf,
    pub max_body_bytes: usize,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: SyncGateway,
    pub access: Arc<dyn AccessControl>,
    pub faults: Arc<FaultLog>,
    pub staging_dir: PathBuf,
}

impl AppState {
    pub fn new(
        settings: &ServerSettings,
        access: Arc<dyn AccessControl>,
        clock: SharedClock,
    ) -> Self {
        let session = SessionLock::new(clock.clone(), settings.session_timeout);
        let watermark = SyncWatermark::starting_now(clock.as_ref());
        let gateway = SyncGateway::new(
            Arc::new(LocalFileOperations::new(&settings.root)),
            Arc::new(session),
            Arc::new(watermark),
            clock,
        );

        Self {
            gateway,
            access,
            faults: Arc::new(FaultLog::new(&settings.fault_log)),
            staging_dir: settings.staging_dir.clone(),
        }
    }
}

/// Build the full application router.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let faults = state.faults.clone();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/beginTransaction", post(handlers::begin_transaction))
        .route("/endTransaction", post(handlers::end_transaction))
        .route("/session", get(handlers::session_status))
        .route("/lastTouch", get(handlers::last_touch))
        .route(
            "/folder",
            put(handlers::create_folders).post(handlers::list_folder),
        )
        .route("/file", delete(handlers::delete_files))
        .route("/file-upload", post(handlers::upload_files))
        .route("/file-download", post(handlers::download_file))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(axum::middleware::from_fn_with_state(
            faults.clone(),
            record_faults,
        ))
        .layer(CatchPanicLayer::custom(panic_recorder(faults)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
