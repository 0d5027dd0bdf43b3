use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use treesync_core::DEFAULT_SESSION_TIMEOUT;

/// Configuration for the treesync server.
#[derive(Parser, Debug, Clone)]
#[command(name = "treesync-server")]
#[command(about = "Personal file-synchronization server with single-writer sessions")]
pub struct Config {
    /// Base directory of the synchronized tree
    #[arg(long, env = "ROOT")]
    pub root: PathBuf,

    /// TCP host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// TCP port to bind to
    #[arg(long, default_value = "3000", env = "PORT")]
    pub port: u16,

    /// Allow-list of bearer tokens, one per line (literal or sha256:<hex>)
    #[arg(long, env = "TOKENS_FILE")]
    pub tokens_file: PathBuf,

    /// Idle time after which another device may take over the session (seconds)
    #[arg(long, default_value_t = DEFAULT_SESSION_TIMEOUT.as_secs(), env = "SESSION_TIMEOUT_SECS")]
    pub session_timeout_secs: u64,

    /// Directory where uploads are spooled before being moved into the tree
    #[arg(long, env = "STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Append-only record of unhandled faults (JSON lines)
    #[arg(long, default_value = "treesync-faults.log", env = "FAULT_LOG")]
    pub fault_log: PathBuf,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = 10 * 1024 * 1024 * 1024, env = "MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Spool directory; kept outside the tree so listings never see it.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("treesync-staging"))
    }

    pub fn settings(&self) -> crate::ServerSettings {
        crate::ServerSettings {
            root: self.root.clone(),
            staging_dir: self.staging_dir(),
            session_timeout: self.session_timeout(),
            fault_log: self.fault_log.clone(),
            max_body_bytes: self.max_upload_bytes,
        }
    }
}
