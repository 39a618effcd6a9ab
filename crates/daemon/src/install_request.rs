// SPDX-License-Identifier: MIT

//! Parses `/package/{install,fetch}`'s request body: one of
//! `{"name": ...}`, `{"localfile": ...}`, or `{"url": ..., "hash": ...}`,
//! arriving either as a plain JSON body or as a multipart form carrying that
//! same JSON under a `specfile` field.

use axum::extract::Multipart;
use inferd_engine::InstallSource;
use inferd_core::DaemonError;
use serde::Deserialize;

#[derive(Deserialize)]
struct InstallSpec {
    name: Option<String>,
    localfile: Option<String>,
    url: Option<String>,
    hash: Option<String>,
}

fn spec_to_source(spec: InstallSpec) -> Result<InstallSource, DaemonError> {
    if let Some(name) = spec.name {
        return Ok(InstallSource::RemoteName(name));
    }
    if let Some(path) = spec.localfile {
        return Ok(InstallSource::LocalFile(path.into()));
    }
    match (spec.url, spec.hash) {
        (Some(url), Some(hash)) => Ok(InstallSource::Url { url, sha256: hash }),
        (Some(_), None) | (None, Some(_)) => {
            Err(DaemonError::Validation("url installs require both url and hash".to_string()))
        }
        (None, None) => Err(DaemonError::Validation(
            "install body must set one of name, localfile, or url+hash".to_string(),
        )),
    }
}

/// Parse a plain JSON install body.
pub fn from_json(body: &[u8]) -> Result<InstallSource, DaemonError> {
    let spec: InstallSpec =
        serde_json::from_slice(body).map_err(|e| DaemonError::Validation(format!("invalid install body: {e}")))?;
    spec_to_source(spec)
}

/// Parse a multipart install body: the `specfile` field holds the same JSON
/// shape `from_json` accepts.
pub async fn from_multipart(mut multipart: Multipart) -> Result<InstallSource, DaemonError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DaemonError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("specfile") {
            let bytes =
                field.bytes().await.map_err(|e| DaemonError::Validation(format!("reading specfile: {e}")))?;
            return from_json(&bytes);
        }
    }
    Err(DaemonError::Validation("multipart install body missing specfile field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_shape_becomes_remote_name() {
        let source = from_json(br#"{"name": "echo"}"#).expect("parses");
        assert!(matches!(source, InstallSource::RemoteName(name) if name == "echo"));
    }

    #[test]
    fn localfile_shape_becomes_local_file() {
        let source = from_json(br#"{"localfile": "/tmp/echo.zip"}"#).expect("parses");
        assert!(matches!(source, InstallSource::LocalFile(path) if path == std::path::Path::new("/tmp/echo.zip")));
    }

    #[test]
    fn url_shape_requires_both_fields() {
        let err = from_json(br#"{"url": "https://example.com/echo.zip"}"#).unwrap_err();
        assert!(matches!(err, DaemonError::Validation(_)));
    }

    #[test]
    fn url_and_hash_shape_becomes_url_source() {
        let source = from_json(br#"{"url": "https://example.com/echo.zip", "hash": "abc"}"#).expect("parses");
        assert!(matches!(source, InstallSource::Url { url, sha256 } if url == "https://example.com/echo.zip" && sha256 == "abc"));
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = from_json(br#"{}"#).unwrap_err();
        assert!(matches!(err, DaemonError::Validation(_)));
    }
}
