//! Download task - streams one transfer to disk
//!
//! The engine never owns transfer state: it reads the record once, then
//! reports every change back through the registry.

use crate::config::CoreConfig;
use crate::error::{Result, ToolkitError};
use crate::paths::{discard_file, temp_path_for};
use crate::registry::TransferRegistry;
use futures::StreamExt;
use reqwest::Client;
use simplekit_types::{Transfer, TransferStatus};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Executes transfers registered in a [`TransferRegistry`]
#[derive(Clone)]
pub struct DownloadEngine {
    client: Client,
    registry: Arc<TransferRegistry>,
    chunk_size: usize,
    stall_timeout: Duration,
}

impl DownloadEngine {
    pub fn new(client: Client, registry: Arc<TransferRegistry>, config: &CoreConfig) -> Self {
        Self {
            client,
            registry,
            chunk_size: config.chunk_size(),
            stall_timeout: config.stall_timeout(),
        }
    }

    /// Run a transfer on its own task
    pub fn spawn(&self, id: Uuid) -> JoinHandle<Result<TransferStatus>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run(id).await })
    }

    /// Drive a transfer to a terminal state and return that state
    ///
    /// Errors are recorded on the transfer itself; the only error returned
    /// here is `NotFound` for an id the registry does not know.
    pub async fn run(&self, id: Uuid) -> Result<TransferStatus> {
        let transfer = self.registry.get(id)?;
        let cancel = self.registry.cancel_token(id).ok_or(ToolkitError::NotFound(id))?;
        let temp_path = temp_path_for(&transfer.destination, id);

        info!("Starting transfer {}: {}", id, transfer.url);

        match self.fetch(&transfer, &temp_path, &cancel).await {
            Ok(received) => {
                self.registry.mark_completed(id);
                info!("Transfer {} completed: {} bytes at {:?}", id, received, transfer.destination);
            }
            Err(ToolkitError::Cancelled) => {
                discard_file(&temp_path).await;
                self.registry.mark_cancelled(id);
                info!("Transfer {} cancelled", id);
            }
            Err(e) => {
                discard_file(&temp_path).await;
                error!("Transfer {} failed: {}", id, e);
                self.registry.mark_failed(id, e.to_failure());
            }
        }

        Ok(self.registry.get(id)?.status)
    }

    /// Stream the body into `temp_path`, then rename it over the destination
    async fn fetch(&self, transfer: &Transfer, temp_path: &Path, cancel: &CancellationToken) -> Result<u64> {
        let id = transfer.id;
        ensure_not_cancelled(cancel)?;

        let response = self.wait(cancel, self.client.get(&transfer.url).send()).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolkitError::HttpStatus {
                status: status.as_u16(),
                url: transfer.url.clone(),
            });
        }

        // No content-length just means progress is reported without a percentage
        let total = response.content_length();
        ensure_not_cancelled(cancel)?;
        if !self.registry.mark_in_progress(id, total) {
            return Err(ToolkitError::Cancelled);
        }
        debug!("Transfer {}: server reported {:?} bytes", id, total);

        let mut file = File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::with_capacity(self.chunk_size);
        let mut received = 0u64;

        loop {
            let Some(piece) = self.wait(cancel, stream.next()).await? else {
                break;
            };
            buffer.extend_from_slice(&piece?);

            while buffer.len() >= self.chunk_size {
                let rest = buffer.split_off(self.chunk_size);
                self.write_chunk(&mut file, &buffer, id, &mut received, total, cancel)
                    .await?;
                buffer = rest;
            }
        }

        if !buffer.is_empty() {
            self.write_chunk(&mut file, &buffer, id, &mut received, total, cancel)
                .await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = total {
            if received != expected {
                return Err(ToolkitError::Truncated { expected, received });
            }
        }

        ensure_not_cancelled(cancel)?;
        tokio::fs::rename(temp_path, &transfer.destination).await?;

        Ok(received)
    }

    /// Await one network step
    ///
    /// Gives up with `Stalled` after `stall_timeout` and with `Cancelled` as
    /// soon as the token fires, whichever comes first.
    async fn wait<F: Future>(&self, cancel: &CancellationToken, step: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolkitError::Cancelled),
            output = tokio::time::timeout(self.stall_timeout, step) => {
                output.map_err(|_| ToolkitError::Stalled(self.stall_timeout.as_secs()))
            }
        }
    }

    /// Write one chunk and report it
    ///
    /// Cancellation is checked on both sides of the write, so no new chunk
    /// starts once the flag is raised.
    async fn write_chunk(
        &self,
        file: &mut File,
        chunk: &[u8],
        id: Uuid,
        received: &mut u64,
        total: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_not_cancelled(cancel)?;
        file.write_all(chunk).await?;
        *received += chunk.len() as u64;
        self.registry.update_progress(id, *received, total);
        ensure_not_cancelled(cancel)
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ToolkitError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_CHUNK_SIZE;
    use crate::engine::build_client;
    use simplekit_types::FailureKind;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_engine(stall_timeout_secs: u64) -> (DownloadEngine, Arc<TransferRegistry>) {
        let config = CoreConfig {
            chunk_size: MIN_CHUNK_SIZE,
            stall_timeout_secs,
            allowed_roots: Vec::new(),
            ..CoreConfig::default()
        };
        let registry = Arc::new(TransferRegistry::new());
        let engine = DownloadEngine::new(build_client(&config).unwrap(), Arc::clone(&registry), &config);
        (engine, registry)
    }

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
    }

    /// Hand-written HTTP/1.1 responder for bodies that need pacing
    struct RawResponse {
        head: String,
        chunks: usize,
        chunk_len: usize,
        pause: Duration,
        hold: Duration,
    }

    async fn serve_raw(response: RawResponse) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = Arc::new(response);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = Arc::clone(&response);
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;
                    if socket.write_all(response.head.as_bytes()).await.is_err() {
                        return;
                    }
                    let block = vec![b'x'; response.chunk_len];
                    for _ in 0..response.chunks {
                        if socket.write_all(&block).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(response.pause).await;
                    }
                    tokio::time::sleep(response.hold).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/image.dmg", addr)
    }

    /// Accepts the request and never answers it
    async fn serve_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(socket);
                });
            }
        });

        format!("http://{}/image.dmg", addr)
    }

    async fn wait_for_status(registry: &TransferRegistry, id: Uuid, status: TransferStatus) {
        for _ in 0..200 {
            if registry.get(id).unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transfer {} never reached {}", id, status);
    }

    #[tokio::test]
    async fn test_download_completes() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..300 * 1024).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/image.dmg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.dmg");
        let (engine, registry) = test_engine(10);
        let url = format!("{}/image.dmg", server.uri());
        let id = registry.create(&url, &dest).await.unwrap().id;

        let status = engine.run(id).await.unwrap();
        assert_eq!(status, TransferStatus::Completed);

        let transfer = registry.get(id).unwrap();
        assert_eq!(transfer.total_bytes, Some(body.len() as u64));
        assert_eq!(transfer.received_bytes, body.len() as u64);
        assert_eq!(transfer.progress(), Some(100.0));
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(dir_entries(dir.path()), vec![dest]);
    }

    #[tokio::test]
    async fn test_download_without_content_length() {
        let url = serve_raw(RawResponse {
            head: "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".into(),
            chunks: 3,
            chunk_len: 100 * 1024,
            pause: Duration::from_millis(10),
            hold: Duration::ZERO,
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.dmg");
        let (engine, registry) = test_engine(10);
        let id = registry.create(&url, &dest).await.unwrap().id;

        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Completed);

        let transfer = registry.get(id).unwrap();
        assert_eq!(transfer.total_bytes, None);
        assert_eq!(transfer.progress(), None);
        assert_eq!(transfer.received_bytes, 300 * 1024);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), transfer.received_bytes);
    }

    #[tokio::test]
    async fn test_http_error_fails_transfer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.dmg");
        let (engine, registry) = test_engine(10);
        let id = registry
            .create(&format!("{}/missing.dmg", server.uri()), &dest)
            .await
            .unwrap()
            .id;

        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Failed);

        let failure = registry.get(id).unwrap().error.unwrap();
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("404"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_fails_transfer() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = test_engine(10);
        let id = registry
            .create(&format!("http://{}/image.dmg", addr), &dir.path().join("image.dmg"))
            .await
            .unwrap()
            .id;

        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Failed);
        assert_eq!(registry.get(id).unwrap().error.unwrap().kind, FailureKind::Network);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = test_engine(10);
        // Never contacted: the flag is checked before the request goes out
        let id = registry
            .create("http://127.0.0.1:9/image.dmg", &dir.path().join("image.dmg"))
            .await
            .unwrap()
            .id;

        assert!(registry.request_cancel(id));
        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Cancelled);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_removes_partial_file() {
        let total = 64 * 64 * 1024;
        let url = serve_raw(RawResponse {
            head: format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", total),
            chunks: 64,
            chunk_len: 64 * 1024,
            pause: Duration::from_millis(25),
            hold: Duration::ZERO,
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.dmg");
        let (engine, registry) = test_engine(10);
        let id = registry.create(&url, &dest).await.unwrap().id;
        let handle = engine.spawn(id);

        // Wait for the first chunk to land
        for _ in 0..200 {
            if registry.get(id).unwrap().received_bytes > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.get(id).unwrap().received_bytes > 0);
        assert!(registry.request_cancel(id));

        assert_eq!(handle.await.unwrap().unwrap(), TransferStatus::Cancelled);
        let transfer = registry.get(id).unwrap();
        assert!(transfer.received_bytes < total as u64);
        assert!(!dest.exists());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_stalled_body_fails_transfer() {
        let url = serve_raw(RawResponse {
            head: "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n".into(),
            chunks: 0,
            chunk_len: 0,
            pause: Duration::ZERO,
            hold: Duration::from_secs(5),
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = test_engine(1);
        let id = registry.create(&url, &dir.path().join("image.dmg")).await.unwrap().id;

        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Failed);
        let failure = registry.get(id).unwrap().error.unwrap();
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("No data received"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_rename_failure_is_filesystem_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("taken");
        let (engine, registry) = test_engine(10);
        let id = registry
            .create(&format!("{}/image.dmg", server.uri()), &dest)
            .await
            .unwrap()
            .id;
        // Occupy the destination with a non-empty directory so the rename fails
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();

        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Failed);
        assert_eq!(registry.get(id).unwrap().error.unwrap().kind, FailureKind::Filesystem);
        assert_eq!(dir_entries(dir.path()), vec![dest]);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let url = serve_silent().await;
        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = test_engine(1);
        let id = registry.create(&url, &dir.path().join("image.dmg")).await.unwrap().id;

        let status = tokio::time::timeout(Duration::from_secs(10), engine.run(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, TransferStatus::Failed);

        let failure = registry.get(id).unwrap().error.unwrap();
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("No data received"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_headers() {
        let url = serve_silent().await;
        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = test_engine(30);
        let id = registry.create(&url, &dir.path().join("image.dmg")).await.unwrap().id;
        let handle = engine.spawn(id);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(registry.get(id).unwrap().status, TransferStatus::Pending);
        assert!(registry.request_cancel(id));

        let status = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(status, TransferStatus::Cancelled);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_body_is_stalled() {
        let url = serve_raw(RawResponse {
            head: "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n".into(),
            chunks: 0,
            chunk_len: 0,
            pause: Duration::ZERO,
            hold: Duration::from_secs(30),
        })
        .await;

        let dir = tempfile::tempdir().unwrap();
        let (engine, registry) = test_engine(30);
        let id = registry.create(&url, &dir.path().join("image.dmg")).await.unwrap().id;
        let handle = engine.spawn(id);

        wait_for_status(&registry, id, TransferStatus::InProgress).await;
        assert!(registry.request_cancel(id));

        let status = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(status, TransferStatus::Cancelled);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_download_to_long_file_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 1024]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(format!("{}.dmg", "a".repeat(236)));
        let (engine, registry) = test_engine(10);
        let id = registry
            .create(&format!("{}/image.dmg", server.uri()), &dest)
            .await
            .unwrap()
            .id;

        assert_eq!(engine.run(id).await.unwrap(), TransferStatus::Completed);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![3u8; 1024]);
        assert_eq!(dir_entries(dir.path()), vec![dest]);
    }

    #[tokio::test]
    async fn test_run_unknown_transfer() {
        let (engine, _registry) = test_engine(10);
        let id = Uuid::new_v4();
        assert!(matches!(engine.run(id).await, Err(ToolkitError::NotFound(missing)) if missing == id));
    }
}
