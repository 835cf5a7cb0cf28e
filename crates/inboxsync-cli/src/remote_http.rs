//! HTTP client for the remote inbox service
//!
//! Routes, relative to the base URL:
//!
//! - `POST   /challenges`        `{"publicKey"}` → `{"challenge"}`
//! - `PUT    /inboxes/messages`  `{"publicKey","signature"}` → `{"messages":[...]}`
//! - `DELETE /inboxes/messages`  `{"publicKey"}`

use std::time::Duration;

use async_trait::async_trait;
use inboxsync_core::{ChallengeResponse, InboxError, InboxResult, PullResponse, RemoteInbox};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyRequest<'a> {
    public_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest<'a> {
    public_key: &'a str,
    signature: &'a str,
}

pub struct HttpRemoteInbox {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRemoteInbox {
    pub fn new(base_url: &str, timeout: Duration) -> InboxResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InboxError::Network(format!("client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(resp: Response, label: &str) -> InboxResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(InboxError::Network(format!("{}: {} {}", label, status, body.trim())))
    }

    async fn parse<T: DeserializeOwned>(resp: Response, label: &str) -> InboxResult<T> {
        Self::check(resp, label)
            .await?
            .json::<T>()
            .await
            .map_err(|e| InboxError::Network(format!("{}: bad response: {}", label, e)))
    }
}

fn transport(label: &str, err: reqwest::Error) -> InboxError {
    InboxError::Network(format!("{}: {}", label, err))
}

#[async_trait]
impl RemoteInbox for HttpRemoteInbox {
    async fn request_challenge(&self, public_key: &str) -> InboxResult<ChallengeResponse> {
        debug!(public_key, "POST challenges");
        let resp = self
            .http
            .post(self.url("challenges"))
            .json(&KeyRequest { public_key })
            .send()
            .await
            .map_err(|e| transport("challenge", e))?;
        Self::parse(resp, "challenge").await
    }

    async fn pull_messages(&self, public_key: &str, signature: &str) -> InboxResult<PullResponse> {
        debug!(public_key, "PUT inboxes/messages");
        let resp = self
            .http
            .put(self.url("inboxes/messages"))
            .json(&PullRequest {
                public_key,
                signature,
            })
            .send()
            .await
            .map_err(|e| transport("pull", e))?;
        Self::parse(resp, "pull").await
    }

    async fn delete_messages(&self, public_key: &str) -> InboxResult<()> {
        debug!(public_key, "DELETE inboxes/messages");
        let resp = self
            .http
            .delete(self.url("inboxes/messages"))
            .json(&KeyRequest { public_key })
            .send()
            .await
            .map_err(|e| transport("delete", e))?;
        Self::check(resp, "delete").await?;
        Ok(())
    }
}
