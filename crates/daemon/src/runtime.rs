use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::DaemonConfig;
use crate::notebook::Notebook;
use crate::rpc::methods::RpcServerState;
use crate::rpc::unix::serve_unix_until_shutdown;
use crate::startup::{bind_socket, remove_pid_file, write_pid_file, DaemonPaths};
use crate::store::app_db::AppDb;
use crate::subscription::BroadcastPushSink;

/// Serve the configured notebook on the daemon socket until `daemon.shutdown`
/// or Ctrl-C, then remove the socket and pid file.
pub async fn run_standalone(config: DaemonConfig, paths: DaemonPaths) -> Result<()> {
    let listener = bind_socket(&paths.socket_path).await?;
    write_pid_file(&paths.pid_path)?;

    let served = match open_notebook(&config, &paths) {
        Ok(served) => served,
        Err(error) => {
            cleanup_paths(&paths);
            return Err(error);
        }
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let state = RpcServerState::new(Arc::clone(&served.notebook), served.push)
        .with_shutdown_notifier(shutdown_tx.clone());
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = ctrl_c_tx.send(());
    });

    info!(socket_path = %paths.socket_path.display(), "standalone daemon started");
    let result = serve_unix_until_shutdown(listener, state, shutdown_rx).await;
    served.notebook.shutdown().await;
    cleanup_paths(&paths);
    result.context("standalone daemon exited with error")
}

struct ServedNotebook {
    notebook: Arc<Notebook>,
    push: BroadcastPushSink,
}

fn open_notebook(config: &DaemonConfig, paths: &DaemonPaths) -> Result<ServedNotebook> {
    let notebook_path = config.notebook_path_in(&paths.base_dir);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let push = BroadcastPushSink::default();

    let notebook = Notebook::open(
        &notebook_path,
        config.notebook_options(),
        Arc::new(push.clone()),
        Arc::clone(&clock),
    )
    .with_context(|| format!("failed to open notebook `{}`", notebook_path.display()))?;

    // Not fatal: the notebook is already open.
    if let Err(error) = record_recent_notebook(&paths.app_db_path, &notebook_path, clock.as_ref()) {
        warn!(?error, "failed to record recently opened notebook");
    }

    Ok(ServedNotebook { notebook: Arc::new(notebook), push })
}

fn record_recent_notebook(app_db_path: &Path, notebook_path: &Path, clock: &dyn Clock) -> Result<()> {
    let app_db = AppDb::open(app_db_path)?;
    app_db.record_opened(&notebook_path.display().to_string(), clock.now_millis())
}

fn cleanup_paths(paths: &DaemonPaths) {
    remove_pid_file(&paths.pid_path);
    let _ = std::fs::remove_file(&paths.socket_path);
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    use super::*;
    use crate::startup::is_daemon_running;

    fn temp_paths(tmp: &TempDir) -> DaemonPaths {
        DaemonPaths::in_dir(tmp.path().join("quire")).expect("runtime dir should be created")
    }

    #[tokio::test]
    async fn standalone_daemon_stops_on_shutdown_request_and_cleans_up() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let paths = temp_paths(&tmp);
        let config = DaemonConfig {
            notebook_path: Some(tmp.path().join("work.db")),
            ..DaemonConfig::default()
        };

        let daemon = tokio::spawn(run_standalone(config, paths.clone()));
        for _ in 0..40 {
            if is_daemon_running(&paths.socket_path).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(
            is_daemon_running(&paths.socket_path).await,
            "daemon should be accepting connections"
        );
        assert!(paths.pid_path.exists(), "pid file should be written on startup");

        let stream = UnixStream::connect(&paths.socket_path).await.expect("client should connect");
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"daemon.shutdown\"}\n")
            .await
            .expect("shutdown request should be written");
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("shutdown response should be readable");
        assert!(line.contains("\"ok\":true"), "unexpected shutdown response: {line}");

        tokio::time::timeout(Duration::from_secs(5), daemon)
            .await
            .expect("daemon should exit after the shutdown request")
            .expect("daemon task should resolve")
            .expect("daemon should shut down cleanly");
        assert!(!paths.socket_path.exists(), "socket should be removed on shutdown");
        assert!(!paths.pid_path.exists(), "pid file should be removed on shutdown");
    }

    #[tokio::test]
    async fn opening_a_notebook_records_it_as_recent() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let paths = temp_paths(&tmp);
        let config = DaemonConfig {
            notebook_path: Some(tmp.path().join("work.db")),
            ..DaemonConfig::default()
        };

        let served = open_notebook(&config, &paths).expect("notebook should open");
        served.notebook.shutdown().await;

        let recent = AppDb::open(&paths.app_db_path)
            .expect("app db should open")
            .list_recent(10)
            .expect("recent notebooks should list");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].local_path, tmp.path().join("work.db").display().to_string());
    }
}
