use anyhow::{Context, Result};
use quire_common::protocol::jsonrpc::{Notification, PUSH_NOTIFICATION_METHOD};
use serde::Serialize;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf};
use tokio::net::UnixListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::rpc::methods::{handle_raw_request, RpcServerState};

/// Serve JSON-RPC 2.0 over a Unix domain socket.
///
/// Framing is newline-delimited JSON in both directions.
pub async fn serve_unix(listener: UnixListener, state: RpcServerState) -> Result<()> {
    loop {
        let (stream, _) =
            listener.accept().await.context("failed to accept unix rpc connection")?;
        spawn_connection(stream, state.clone());
    }
}

/// Like `serve_unix`, returning once a shutdown signal arrives.
pub async fn serve_unix_until_shutdown(
    listener: UnixListener,
    state: RpcServerState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("failed to accept unix rpc connection")?;
                spawn_connection(stream, state.clone());
            }
            _ = shutdown_rx.recv() => {
                info!("rpc server shutting down");
                return Ok(());
            }
        }
    }
}

fn spawn_connection(stream: tokio::net::UnixStream, state: RpcServerState) {
    tokio::spawn(async move {
        if let Err(error) = serve_connection(stream, state).await {
            warn!(?error, "unix rpc connection failed");
        }
    });
}

/// Handle a single RPC stream. Each request line yields one response line;
/// push messages are interleaved as `push.message` notifications.
///
/// Documents left open and subscriptions left active by the client are
/// released when the stream ends, cleanly or not.
pub async fn serve_connection<IO>(stream: IO, state: RpcServerState) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let state = state.for_connection();
    let result = run_connection(stream, &state).await;
    let released = state.release_connection();
    debug!(leases = released.leases, subscriptions = released.subscriptions, "connection closed");
    result
}

async fn run_connection<IO>(stream: IO, state: &RpcServerState) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut pushes = state.subscribe_pushes();
    let mut pushes_open = true;
    // Kept across loop turns: a read interrupted by a push resumes into it.
    let mut request_line = Vec::new();

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut request_line) => {
                let bytes_read = read.context("failed to read json-rpc request")?;
                if bytes_read == 0 {
                    return Ok(());
                }

                trim_line_endings(&mut request_line);
                if !request_line.iter().all(|byte| byte.is_ascii_whitespace()) {
                    let response = handle_raw_request(&request_line, state).await;
                    write_line(&mut write_half, &response).await?;
                }
                request_line.clear();
            }
            push = pushes.recv(), if pushes_open => match push {
                Ok(message) => {
                    let params = serde_json::to_value(&message)
                        .context("failed to serialize push message")?;
                    let notification = Notification::new(PUSH_NOTIFICATION_METHOD, Some(params));
                    write_line(&mut write_half, &notification).await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "connection fell behind; push messages dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("push channel closed");
                    pushes_open = false;
                }
            },
        }
    }
}

async fn write_line<IO, T>(write_half: &mut WriteHalf<IO>, message: &T) -> Result<()>
where
    IO: AsyncWrite,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message).context("failed to serialize json-rpc message")?;
    encoded.push(b'\n');
    write_half.write_all(&encoded).await.context("failed to write json-rpc message")?;
    write_half.flush().await.context("failed to flush json-rpc message")?;
    Ok(())
}

fn trim_line_endings(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use quire_common::protocol::jsonrpc::{Request, RequestId, Response};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::{UnixListener, UnixStream};

    use super::{serve_unix, RpcServerState};
    use crate::clock::SystemClock;
    use crate::notebook::{Notebook, NotebookOptions};
    use crate::subscription::{BroadcastPushSink, DebounceConfig};

    fn state(tmp: &TempDir) -> RpcServerState {
        let push = BroadcastPushSink::default();
        let options = NotebookOptions {
            doc_list_debounce: DebounceConfig::with_millis(50),
            ..NotebookOptions::default()
        };
        let notebook = Notebook::open(
            tmp.path().join("notebook.db"),
            options,
            Arc::new(push.clone()),
            Arc::new(SystemClock),
        )
        .expect("notebook should open");
        RpcServerState::new(Arc::new(notebook), push)
    }

    fn bind(tmp: &TempDir) -> Option<(UnixListener, std::path::PathBuf)> {
        let socket_path = tmp.path().join("quired.sock");
        match UnixListener::bind(&socket_path) {
            Ok(listener) => Some((listener, socket_path)),
            Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
                eprintln!("skipping unix socket test: bind is not permitted in this environment");
                None
            }
            Err(error) => panic!("failed to bind unix socket: {error}"),
        }
    }

    #[tokio::test]
    async fn accepts_concurrent_unix_connections() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let Some((listener, socket_path)) = bind(&tmp) else {
            return;
        };
        let server = tokio::spawn(serve_unix(listener, state(&tmp)));

        let mut clients = Vec::new();
        for client_id in 0_i64..8_i64 {
            let socket_path = socket_path.clone();
            clients.push(tokio::spawn(async move {
                let stream = UnixStream::connect(&socket_path).await.expect("client should connect");
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let request = Request::new("rpc.ping", None, RequestId::Number(client_id));
                write_request(&mut write_half, &request).await;
                read_response(&mut reader).await
            }));
        }

        for (expected_id, task) in (0_i64..8_i64).zip(clients) {
            let response = task.await.expect("client call should complete");
            assert_eq!(response.id, RequestId::Number(expected_id));
            assert_eq!(response.result, Some(json!({ "ok": true })));
        }

        server.abort();
        let _ = server.await;
    }

    #[tokio::test]
    async fn pushes_are_interleaved_as_notifications() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let Some((listener, socket_path)) = bind(&tmp) else {
            return;
        };
        let server = tokio::spawn(serve_unix(listener, state(&tmp)));

        let stream = UnixStream::connect(&socket_path).await.expect("client should connect");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_request(&mut write_half, &Request::new("doclist.subscribe", None, RequestId::Number(1)))
            .await;
        let subscribed = read_line(&mut reader).await;
        let sub_id = subscribed["result"]["sub_id"].as_str().unwrap().to_string();

        write_request(
            &mut write_half,
            &Request::new("doc.create", Some(json!({ "title": "Inbox" })), RequestId::Number(2)),
        )
        .await;

        // The create response and list pushes may arrive in either order.
        let push = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let line = read_line(&mut reader).await;
                if line["method"] == "push.message" {
                    return line;
                }
                assert_eq!(line["id"], 2);
            }
        })
        .await
        .expect("list push should arrive");
        assert_eq!(push["params"]["kind"], "doc_list_changed");
        assert_eq!(push["params"]["sub_id"], sub_id.as_str());
        assert!(push.get("id").is_none());

        server.abort();
        let _ = server.await;
    }

    async fn write_request(write_half: &mut OwnedWriteHalf, request: &Request) {
        let mut encoded =
            serde_json::to_vec(request).expect("request should serialize for test transport");
        encoded.push(b'\n');
        write_half.write_all(&encoded).await.expect("request write should succeed");
        write_half.flush().await.expect("request flush should succeed");
    }

    async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Value {
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await.expect("line should be readable");
        serde_json::from_slice(&line).expect("line should decode")
    }

    async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> Response {
        serde_json::from_value(read_line(reader).await).expect("response should decode")
    }
}
