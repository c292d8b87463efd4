//! Remote backup: push and pull an exported backup to a private server.
//!
//! The server keeps one document per secret. Upload is a bearer-authenticated
//! POST of the envelope, download a GET of the same URL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parlor_core::error::{ImportError, ProviderError};
use parlor_core::provider::{HttpMethod, Transport, WireRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Application tag written into every envelope.
pub const APP_NAME: &str = "parlor";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Backup server not configured: {0}")]
    NotConfigured(String),

    #[error("Backup server unreachable: {0}")]
    Network(String),

    #[error("Backup server rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Backup server returned an unreadable document: {0}")]
    InvalidPayload(String),
}

impl From<ProviderError> for RemoteError {
    fn from(e: ProviderError) -> Self {
        RemoteError::Network(e.to_string())
    }
}

impl From<ImportError> for RemoteError {
    fn from(e: ImportError) -> Self {
        RemoteError::InvalidPayload(e.to_string())
    }
}

/// What travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEnvelope {
    /// RFC 3339, UTC
    pub backup_at: String,
    pub app: String,
    pub data: Map<String, Value>,
}

impl BackupEnvelope {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            backup_at: Utc::now().to_rfc3339(),
            app: APP_NAME.into(),
            data,
        }
    }
}

/// Opaque upload/download of a backup document.
#[async_trait]
pub trait BackupTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, envelope: &BackupEnvelope) -> Result<(), RemoteError>;

    async fn download(&self) -> Result<BackupEnvelope, RemoteError>;
}

/// A private backup server speaking plain JSON over HTTP.
pub struct HttpBackup {
    transport: Arc<dyn Transport>,
    url: String,
    token: String,
}

impl HttpBackup {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, token: impl Into<String>) -> Result<Self, RemoteError> {
        let url = url.into().trim().to_string();
        let token = token.into();
        if url.is_empty() || token.trim().is_empty() {
            return Err(RemoteError::NotConfigured(
                "set both the backup URL and the backup secret".into(),
            ));
        }
        Ok(Self { transport, url, token })
    }

    fn request(&self, method: HttpMethod, body: Option<Value>) -> WireRequest {
        let mut headers = vec![("Authorization".to_string(), format!("Bearer {}", self.token))];
        if body.is_some() {
            headers.push(("Content-Type".into(), "application/json".into()));
        }
        WireRequest {
            method,
            url: self.url.clone(),
            headers,
            body,
        }
    }
}

#[async_trait]
impl BackupTransport for HttpBackup {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, envelope: &BackupEnvelope) -> Result<(), RemoteError> {
        let body = serde_json::to_value(envelope).map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;
        debug!(url = %self.url, keys = envelope.data.len(), "Uploading backup");

        let response = self.transport.execute(self.request(HttpMethod::Post, Some(body))).await?;
        if !response.is_success() {
            return Err(RemoteError::Rejected {
                status: response.status,
                body: response.body,
            });
        }
        info!(url = %self.url, "Backup uploaded");
        Ok(())
    }

    async fn download(&self) -> Result<BackupEnvelope, RemoteError> {
        let response = self.transport.execute(self.request(HttpMethod::Get, None)).await?;
        if !response.is_success() {
            return Err(RemoteError::Rejected {
                status: response.status,
                body: response.body,
            });
        }
        serde_json::from_str(&response.body).map_err(|e| RemoteError::InvalidPayload(e.to_string()))
    }
}
