//! Durable record of unhandled faults.
//!
//! Internal errors reach clients as a bare 500. The details are appended,
//! one JSON object per line, to a log file kept for postmortems.

use std::any::Any;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

/// Response extension carrying the message of an internal error.
#[derive(Debug, Clone)]
pub struct Fault(pub String);

#[derive(Serialize)]
struct FaultEntry<'a> {
    at: String,
    context: &'a str,
    message: &'a str,
}

#[derive(Debug)]
pub struct FaultLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FaultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, context: &str, message: &str) {
        error!("Unhandled fault in {}: {}", context, message);

        let entry = FaultEntry {
            at: chrono::Utc::now().to_rfc3339(),
            context,
            message,
        };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode fault record: {}", e);
                return;
            }
        };

        let _guard = self.write_lock.lock().expect("fault log lock poisoned");
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = written {
            warn!("Failed to write fault record to {}: {}", self.path.display(), e);
        }
    }
}

/// Middleware: write down every response that carries a `Fault`.
pub async fn record_faults(
    State(faults): State<Arc<FaultLog>>,
    request: Request,
    next: Next,
) -> Response {
    let context = format!("{} {}", request.method(), request.uri().path());
    let response = next.run(request).await;
    if let Some(Fault(message)) = response.extensions().get::<Fault>() {
        faults.record(&context, message);
    }
    response
}

/// Panic handler for `CatchPanicLayer`: record the panic, answer 500.
pub fn panic_recorder(
    faults: Arc<FaultLog>,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone + Send + Sync + 'static {
    move |panic| {
        let message = if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "unknown panic payload".to_string()
        };
        faults.record("handler panic", &message);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
