// Runtime files: PID file, Unix socket creation, readiness signaling.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::config::global_dir;

/// Default socket path: ~/.quire/quired.sock
const SOCKET_NAME: &str = "quired.sock";
/// PID file: ~/.quire/quired.pid (diagnostics only)
const PID_FILE_NAME: &str = "quired.pid";
/// Recently opened notebooks: ~/.quire/app.db
const APP_DB_FILE_NAME: &str = "app.db";

/// Resolved paths for daemon runtime files.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub app_db_path: PathBuf,
}

impl DaemonPaths {
    /// Resolve paths under `~/.quire/`, creating the directory.
    pub fn resolve() -> Result<Self> {
        let base_dir = global_dir().context("could not determine home directory")?;
        Self::in_dir(base_dir)
    }

    pub fn in_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create `{}`", base_dir.display()))?;
        ensure_owner_only_dir(&base_dir)?;
        Ok(Self {
            socket_path: base_dir.join(SOCKET_NAME),
            pid_path: base_dir.join(PID_FILE_NAME),
            app_db_path: base_dir.join(APP_DB_FILE_NAME),
            base_dir,
        })
    }

    /// Replace the socket location, e.g. from a command-line flag.
    pub fn with_socket_path(mut self, socket_path: PathBuf) -> Self {
        self.socket_path = socket_path;
        self
    }
}

/// Write the current process PID.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = fs::File::create(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    ensure_owner_only_file(path)?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// Remove stale socket file and bind a new Unix listener.
/// The daemon signals readiness by accepting connections on this socket.
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        fs::remove_file(path).context("failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(path).context("failed to bind Unix socket")?;
    info!(path = %path.display(), "daemon socket ready");
    Ok(listener)
}

/// Check if a daemon is already running by connecting to the socket.
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    tokio::net::UnixStream::connect(socket_path).await.is_ok()
}

/// Restrict a file to its owner (0600). Missing files are ignored.
pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    set_mode_if_present(path, 0o600)
}

/// Restrict a directory to its owner (0700). Missing directories are ignored.
pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    set_mode_if_present(path, 0o700)
}

#[cfg(unix)]
fn set_mode_if_present(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
    if metadata.permissions().mode() & 0o777 != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode_if_present(path: &Path, _mode: u32) -> Result<()> {
    let _ = path;
    Ok(())
}
