use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form as MultipartForm, Part as MultipartPart};

use super::strategy::{OutboundBody, OutboundRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub status: u16,
    pub body: String,
}

impl BackendReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carries one request to the backend. Errors are transport failures only;
/// HTTP error statuses come back as a `BackendReply`.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequest, api_key: &str) -> Result<BackendReply>;
}

pub struct ReqwestTransport {
    api_base: String,
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build render backend HTTP client")?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl BackendTransport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest, api_key: &str) -> Result<BackendReply> {
        let endpoint = format!("{}{}", self.api_base, request.path);
        let builder = self.http.post(&endpoint).bearer_auth(api_key);
        let builder = match &request.body {
            OutboundBody::Multipart { fields, file } => {
                let mut form = MultipartForm::new();
                for (key, value) in fields {
                    form = form.text(key.clone(), value.clone());
                }
                let part = MultipartPart::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.mime)
                    .with_context(|| format!("invalid mime '{}'", file.mime))?;
                builder.multipart(form.part(file.field.clone(), part))
            }
            OutboundBody::Json(payload) => builder.json(payload),
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("render backend request failed ({endpoint})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("render backend response body read failed")?;
        Ok(BackendReply { status, body })
    }
}
