//! Local IPC endpoint.
//!
//! A Unix domain socket on Unix-like systems, a named pipe on Windows. Each
//! connection is served by its own task: lines in, lines out, in order.

use crate::error::{CurfewError, Result};
use crate::protocol::{Response, Router};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

/// Longest request line accepted, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Connections served at the same time; further clients are refused.
pub const MAX_CONNECTIONS: usize = 32;

/// Serve one connection until the peer closes it.
///
/// A line longer than [`MAX_LINE_BYTES`] gets an error response and the
/// connection is closed, since the next line boundary is unknown.
pub async fn serve_connection<S>(stream: S, router: Router) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(());
        }
        if buf.len() >= MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            debug!(limit = MAX_LINE_BYTES, "request line too long, closing connection");
            let response = Response::error(format!(
                "Request line exceeds {} bytes",
                MAX_LINE_BYTES
            ));
            writer.write_all(response.to_line().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            return Ok(());
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => router.handle_line(line.trim_end_matches(['\r', '\n'])).await,
            Err(_) => Response::error("Request is not valid UTF-8").to_line(),
        };

        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
}

/// Serve `stream` on its own task if a connection slot is free.
fn spawn_connection<S>(stream: S, router: Router, slots: &Arc<Semaphore>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Ok(permit) = Arc::clone(slots).try_acquire_owned() else {
        warn!("connection limit reached, refusing client");
        return;
    };
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = serve_connection(stream, router).await {
            warn!(error = %e, "connection closed with error");
        }
    });
}

fn daemon_error(context: &str, path: &Path, e: std::io::Error) -> CurfewError {
    CurfewError::DaemonError(format!("{} '{}': {}", context, path.display(), e))
}

#[cfg(unix)]
pub use self::unix::{bind, run};

#[cfg(windows)]
pub use self::windows::{bind, run};

#[cfg(unix)]
mod unix {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    /// Bind the socket, clearing a stale one left by a crashed daemon.
    ///
    /// Fails if another daemon is answering on the path.
    pub async fn bind(path: &Path) -> Result<UnixListener> {
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            use std::os::unix::fs::FileTypeExt;
            if !metadata.file_type().is_socket() {
                return Err(CurfewError::DaemonError(format!(
                    "path '{}' exists but is not a socket",
                    path.display()
                )));
            }
            if UnixStream::connect(path).await.is_ok() {
                return Err(CurfewError::DaemonError(format!(
                    "another daemon is already listening on '{}'",
                    path.display()
                )));
            }
            std::fs::remove_file(path)
                .map_err(|e| daemon_error("failed to remove stale socket", path, e))?;
            debug!(path = %path.display(), "removed stale socket");
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| daemon_error("failed to create socket directory", parent, e))?;
        }

        let listener =
            UnixListener::bind(path).map_err(|e| daemon_error("failed to bind socket", path, e))?;

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| daemon_error("failed to set socket permissions on", path, e))?;

        info!(path = %path.display(), "listening");
        Ok(listener)
    }

    /// Accept connections until `shutdown` flips to `true`.
    pub async fn run(
        listener: UnixListener,
        router: Router,
        shutdown: watch::Receiver<bool>,
        path: &Path,
    ) -> Result<()> {
        accept_loop(listener, router, shutdown, path, MAX_CONNECTIONS).await
    }

    pub(super) async fn accept_loop(
        listener: UnixListener,
        router: Router,
        mut shutdown: watch::Receiver<bool>,
        path: &Path,
        max_connections: usize,
    ) -> Result<()> {
        let slots = Arc::new(Semaphore::new(max_connections));
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) =
                        accepted.map_err(|e| daemon_error("accept failed on", path, e))?;
                    spawn_connection(stream, router.clone(), &slots);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Send one request line and wait for its response line.
    pub async fn request(path: &Path, line: &str) -> Result<String> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| daemon_error("failed to connect to daemon at", path, e))?;
        super::exchange(stream, line, path).await
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};

    /// Create the first pipe instance. Fails if another daemon owns the name.
    pub async fn bind(path: &Path) -> Result<NamedPipeServer> {
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(path.as_os_str())
            .map_err(|e| daemon_error("failed to create pipe", path, e))?;
        info!(path = %path.display(), "listening");
        Ok(server)
    }

    pub async fn run(
        mut server: NamedPipeServer,
        router: Router,
        mut shutdown: watch::Receiver<bool>,
        path: &Path,
    ) -> Result<()> {
        let slots = Arc::new(Semaphore::new(MAX_CONNECTIONS));
        loop {
            tokio::select! {
                connected = server.connect() => {
                    connected.map_err(|e| daemon_error("pipe connect failed on", path, e))?;
                    let next = ServerOptions::new()
                        .create(path.as_os_str())
                        .map_err(|e| daemon_error("failed to create pipe", path, e))?;
                    let client = std::mem::replace(&mut server, next);
                    spawn_connection(client, router.clone(), &slots);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    pub async fn request(path: &Path, line: &str) -> Result<String> {
        let client = ClientOptions::new()
            .open(path.as_os_str())
            .map_err(|e| daemon_error("failed to connect to daemon at", path, e))?;
        super::exchange(client, line, path).await
    }
}

#[cfg(unix)]
pub use self::unix::request;

#[cfg(windows)]
pub use self::windows::request;

async fn exchange<S>(stream: S, line: &str, path: &Path) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    writer
        .write_all(format!("{}\n", line.trim_end()).as_bytes())
        .await
        .map_err(|e| daemon_error("failed to send request to", path, e))?;
    writer
        .flush()
        .await
        .map_err(|e| daemon_error("failed to send request to", path, e))?;

    let mut response = String::new();
    BufReader::new(reader)
        .read_line(&mut response)
        .await
        .map_err(|e| daemon_error("failed to read response from", path, e))?;
    if response.is_empty() {
        return Err(CurfewError::DaemonError(format!(
            "daemon at '{}' closed the connection without responding",
            path.display()
        )));
    }
    Ok(response.trim_end().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::EngineFixture;
    use serde_json::Value;

    async fn start(fixture: &EngineFixture) -> (std::path::PathBuf, watch::Sender<bool>) {
        let path = fixture.home().join("curfew.sock");
        let listener = bind(&path).await.unwrap();
        let (tx, rx) = watch::channel(false);
        let router = fixture.router();
        let socket = path.clone();
        tokio::spawn(async move { run(listener, router, rx, &socket).await });
        (path, tx)
    }

    #[tokio::test]
    async fn test_request_response_over_socket() {
        let fixture = EngineFixture::new();
        let (path, shutdown) = start(&fixture).await;

        let line = request(&path, r#"{"type":"status"}"#).await.unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["type"], "status");
        assert_eq!(response["lock"]["status"], "unlocked");

        shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_connection_survives_malformed_lines() {
        let fixture = EngineFixture::new();
        let (path, shutdown) = start(&fixture).await;

        let stream = tokio::net::UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = tokio::io::split(stream);
        writer
            .write_all(b"garbage\n\n{\"type\":\"unlock\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["type"], "error");
        assert_eq!(second["type"], "unlock");
        assert_eq!(second["ok"], true);

        shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_refuses_second_daemon_and_clears_stale_socket() {
        let fixture = EngineFixture::new();
        let (path, shutdown) = start(&fixture).await;

        let err = bind(&path).await.unwrap_err();
        assert!(err.to_string().contains("already listening"));

        shutdown.send(true).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // The listener is gone but the socket file is left behind.
        assert!(path.exists());
        bind(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected_and_connection_closed() {
        let fixture = EngineFixture::new();
        let (client, server) = tokio::io::duplex(4 * MAX_LINE_BYTES);
        let served = tokio::spawn(serve_connection(server, fixture.router()));

        let (reader, mut writer) = tokio::io::split(client);
        writer.write_all(&vec![b'x'; MAX_LINE_BYTES + 100]).await.unwrap();
        writer.write_all(b"\n{\"type\":\"status\"}\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["type"], "error");
        assert!(first["message"].as_str().unwrap().contains("exceeds"));
        assert!(lines.next_line().await.unwrap().is_none());
        served.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_line_at_limit_minus_newline_is_served() {
        let fixture = EngineFixture::new();
        let (client, server) = tokio::io::duplex(4 * MAX_LINE_BYTES);
        tokio::spawn(serve_connection(server, fixture.router()));

        let request = r#"{"type":"status"}"#;
        let mut line = request.to_string();
        line.push_str(&" ".repeat(MAX_LINE_BYTES - 1 - request.len()));
        line.push('\n');

        let (reader, mut writer) = tokio::io::split(client);
        writer.write_all(line.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let response: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response["type"], "status");
    }

    #[tokio::test]
    async fn test_clients_beyond_the_limit_are_refused() {
        let fixture = EngineFixture::new();
        let path = fixture.home().join("curfew.sock");
        let listener = bind(&path).await.unwrap();
        let (shutdown, rx) = watch::channel(false);
        let router = fixture.router();
        let socket = path.clone();
        tokio::spawn(async move { unix::accept_loop(listener, router, rx, &socket, 1).await });

        // The first client holds the only slot.
        let held = tokio::net::UnixStream::connect(&path).await.unwrap();
        let (held_reader, mut held_writer) = tokio::io::split(held);
        held_writer.write_all(b"{\"type\":\"status\"}\n").await.unwrap();
        let mut held_lines = BufReader::new(held_reader).lines();
        assert!(held_lines.next_line().await.unwrap().is_some());

        let refused = tokio::net::UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = tokio::io::split(refused);
        let _ = writer.write_all(b"{\"type\":\"status\"}\n").await;
        let mut lines = BufReader::new(reader).lines();
        assert!(matches!(lines.next_line().await, Ok(None) | Err(_)));

        shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_refuses_non_socket_path() {
        let fixture = EngineFixture::new();
        let path = fixture.home().join("curfew.sock");
        std::fs::write(&path, "not a socket").unwrap();

        let err = bind(&path).await.unwrap_err();
        assert!(matches!(err, CurfewError::DaemonError(_)));
    }
}
