// SPDX-License-Identifier: MIT

//! The resumable, content-addressed download algorithm: check for an
//! existing complete file, resume a partial one with a `Range` request,
//! stream and hash as bytes arrive, and reject anything that doesn't match
//! the expected digest.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use inferd_core::DaemonError;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::locks::DownloadLocks;

const CHUNK_LOG_EVERY: u64 = 64 * 1024;

/// Sink the scheduler implements to receive download progress for the
/// currently-running job. Kept here so this crate doesn't depend on
/// `inferd-engine`.
pub trait ProgressSink: Send + Sync {
    /// Called once, when `Content-Length` is first known.
    fn set_size(&self, total_bytes: u64);
    /// Called after each chunk is flushed to disk.
    fn add_progress(&self, bytes_so_far: u64);
    /// Polled once per chunk in the streaming loop so a cancelled job's
    /// download unwinds at the next chunk boundary rather than running to
    /// completion. Default `false` for sinks with no cancellation source.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A sink that discards all progress; used by callers that don't care
/// (e.g. tests, or downloads issued outside a job context).
pub struct NullSink;

impl ProgressSink for NullSink {
    fn set_size(&self, _total_bytes: u64) {}
    fn add_progress(&self, _bytes_so_far: u64) {}
}

fn downloads_dir(root: &Path) -> PathBuf {
    root.join("downloads")
}

/// Produce a local path for `(url, expected_sha256)` such that the file at
/// that path has exactly the expected digest.
pub async fn download(
    client: &reqwest::Client,
    locks: &DownloadLocks,
    root: &Path,
    url: &str,
    expected_sha256: &str,
    sink: &dyn ProgressSink,
) -> Result<PathBuf, DaemonError> {
    let dir = downloads_dir(root);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| DaemonError::PackageStorageError(format!("creating downloads dir: {e}")))?;

    let final_path = dir.join(expected_sha256);
    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        tracing::debug!(sha256 = expected_sha256, "download already present on disk");
        return Ok(final_path);
    }

    let _guard = locks.try_acquire(expected_sha256).ok_or_else(|| {
        tracing::debug!(sha256 = expected_sha256, "download collided with an in-flight transfer");
        DaemonError::DownloadCollision(expected_sha256.to_string())
    })?;

    // Another caller may have finished while we waited for the lock.
    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        return Ok(final_path);
    }

    let part_path = dir.join(format!("{expected_sha256}.part"));
    let mut resume_from: u64 = 0;

    if let Ok(meta) = tokio::fs::metadata(&part_path).await {
        let existing_len = meta.len();
        let probe = client
            .head(url)
            .send()
            .await
            .map_err(|e| DaemonError::ConnectionError(e.to_string()))?;
        let accepts_ranges = probe
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .map(|v| v.as_bytes() != b"none")
            .unwrap_or(false);
        if accepts_ranges && existing_len > 0 {
            resume_from = existing_len;
        } else {
            let _ = tokio::fs::remove_file(&part_path).await;
        }
    }

    let mut request = client.get(url);
    if resume_from > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| DaemonError::ConnectionError(e.to_string()))?;
    if !response.status().is_success() && response.status().as_u16() != 206 {
        return Err(DaemonError::RemoteFailed(format!(
            "GET {url} returned {}",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        sink.set_size(resume_from + len);
    }

    let mut file = if resume_from > 0 {
        let mut f = File::options().write(true).open(&part_path).await.map_err(|e| {
            DaemonError::PackageStorageError(format!("reopening partial download: {e}"))
        })?;
        f.seek(SeekFrom::End(0))
            .await
            .map_err(|e| DaemonError::PackageStorageError(format!("seeking partial download: {e}")))?;
        f
    } else {
        File::create(&part_path)
            .await
            .map_err(|e| DaemonError::PackageStorageError(format!("creating partial download: {e}")))?
    };

    let mut written = resume_from;
    let mut since_last_log: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        if sink.is_cancelled() {
            drop(file);
            return Err(DaemonError::JobInterrupted);
        }
        let chunk = chunk.map_err(|e| DaemonError::ConnectionError(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DaemonError::PackageStorageError(format!("writing chunk: {e}")))?;
        written += chunk.len() as u64;
        since_last_log += chunk.len() as u64;
        if since_last_log >= CHUNK_LOG_EVERY {
            sink.add_progress(written);
            since_last_log = 0;
        }
    }
    file.flush()
        .await
        .map_err(|e| DaemonError::PackageStorageError(format!("flushing download: {e}")))?;
    sink.add_progress(written);
    drop(file);

    let actual = sha256_file(&part_path).await?;
    if actual != expected_sha256 {
        let _ = tokio::fs::remove_file(&part_path).await;
        tracing::warn!(url, expected = expected_sha256, actual = %actual, "download hash mismatch");
        return Err(DaemonError::HashMismatch {
            expected: expected_sha256.to_string(),
            actual,
        });
    }

    tokio::fs::rename(&part_path, &final_path)
        .await
        .map_err(|e| DaemonError::PackageStorageError(format!("finalizing download: {e}")))?;

    tracing::info!(url, bytes = written, sha256 = expected_sha256, "download completed");
    Ok(final_path)
}

async fn sha256_file(path: &Path) -> Result<String, DaemonError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| DaemonError::PackageStorageError(format!("reading for hash: {e}")))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| DaemonError::PackageStorageError(format!("hashing download: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    #[tokio::test]
    async fn downloads_and_verifies_matching_hash() {
        let server = MockServer::start().await;
        let body = b"hello inference daemon".to_vec();
        let hash = sha256_hex(&body);
        Mock::given(method("GET"))
            .and(path("/pkg.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let client = reqwest::Client::new();
        let locks = DownloadLocks::new();
        let url = format!("{}/pkg.zip", server.uri());

        let path = download(&client, &locks, tmp.path(), &url, &hash, &NullSink)
            .await
            .expect("download succeeds");
        let on_disk = tokio::fs::read(&path).await.expect("read downloaded file");
        assert_eq!(on_disk, body);
    }

    #[tokio::test]
    async fn hash_mismatch_is_rejected_and_cleans_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wrong bytes".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let client = reqwest::Client::new();
        let locks = DownloadLocks::new();
        let url = format!("{}/pkg.zip", server.uri());
        let expected = "0".repeat(64);

        let err = download(&client, &locks, tmp.path(), &url, &expected, &NullSink)
            .await
            .expect_err("mismatched hash must fail");
        assert!(matches!(err, DaemonError::HashMismatch { .. }));
        assert!(!tmp.path().join("downloads").join(&expected).exists());
    }

    #[tokio::test]
    async fn second_caller_sees_collision_while_first_holds_lock() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let locks = DownloadLocks::new();
        let _guard = locks.try_acquire("deadbeef").expect("first holds lock");
        let client = reqwest::Client::new();

        let err = download(&client, &locks, tmp.path(), "http://example.invalid/x", "deadbeef", &NullSink)
            .await
            .expect_err("second caller collides");
        assert!(matches!(err, DaemonError::DownloadCollision(_)));
    }

    struct CancelledSink;
    impl ProgressSink for CancelledSink {
        fn set_size(&self, _total_bytes: u64) {}
        fn add_progress(&self, _bytes_so_far: u64) {}
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_the_chunk_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello inference daemon".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let client = reqwest::Client::new();
        let locks = DownloadLocks::new();
        let url = format!("{}/pkg.zip", server.uri());
        let hash = "0".repeat(64);

        let err = download(&client, &locks, tmp.path(), &url, &hash, &CancelledSink)
            .await
            .expect_err("cancelled download must fail");
        assert!(matches!(err, DaemonError::JobInterrupted));
        assert!(!tmp.path().join("downloads").join(&hash).exists());
    }

    #[tokio::test]
    async fn cached_final_path_short_circuits_network() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let hash = "cafef00d";
        let dir = tmp.path().join("downloads");
        tokio::fs::create_dir_all(&dir).await.expect("mkdir");
        tokio::fs::write(dir.join(hash), b"cached").await.expect("seed cache");

        let client = reqwest::Client::new();
        let locks = DownloadLocks::new();
        let path = download(&client, &locks, tmp.path(), "http://example.invalid/unused", hash, &NullSink)
            .await
            .expect("cached file short-circuits");
        assert_eq!(tokio::fs::read(&path).await.expect("read"), b"cached");
    }
}
