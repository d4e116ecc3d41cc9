//! Slack Web API calls the bot needs: posting replies, uploading result
//! files, identifying itself, and opening Socket Mode connections.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

pub const SLACK_API_BASE: &str = "https://slack.com/api";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("{method} request failed: {detail}")]
    Transport { method: String, detail: String },
    #[error("{method} returned error `{error}`")]
    Api { method: String, error: String },
    #[error("{method} response could not be decoded: {detail}")]
    Decode { method: String, detail: String },
}

/// Outbound side of the chat collaborator.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn reply(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), ChatError>;

    async fn upload_file(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<(), ChatError>;
}

pub struct SlackWebClient {
    http: Client,
    bot_token: SecretString,
    api_base: String,
}

impl SlackWebClient {
    pub fn new(bot_token: SecretString, https_proxy: Option<&str>) -> Result<Self, ChatError> {
        let mut builder = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("axonbot/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = https_proxy.map(str::trim).filter(|proxy| !proxy.is_empty()) {
            let proxy = Proxy::https(proxy).map_err(|error| transport("proxy", error))?;
            builder = builder.proxy(proxy);
        }
        let http = builder.build().map_err(|error| transport("client", error))?;

        Ok(Self { http, bot_token, api_base: SLACK_API_BASE.to_owned() })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    /// Bot user id of the token owner; messages from it are never handled.
    pub async fn auth_test(&self) -> Result<String, ChatError> {
        let response = self.call("auth.test", &self.bot_token, &json!({})).await?;
        string_field(&response, "auth.test", "user_id")
    }

    /// Fresh Socket Mode websocket URL for the app-level token.
    pub async fn open_socket_url(&self, app_token: &SecretString) -> Result<String, ChatError> {
        let response = self.call("apps.connections.open", app_token, &json!({})).await?;
        string_field(&response, "apps.connections.open", "url")
    }

    async fn call(
        &self,
        method: &str,
        token: &SecretString,
        payload: &Value,
    ) -> Result<Value, ChatError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|error| transport(method, error))?;
        let body = response.json::<Value>().await.map_err(|error| ChatError::Decode {
            method: method.to_owned(),
            detail: error.to_string(),
        })?;

        check_ok(method, body)
    }

    async fn upload_url(&self, filename: &str, length: usize) -> Result<(String, String), ChatError> {
        let method = "files.getUploadURLExternal";
        let length = length.to_string();
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(self.bot_token.expose_secret())
            .form(&[("filename", filename), ("length", length.as_str())])
            .send()
            .await
            .map_err(|error| transport(method, error))?;
        let body = response.json::<Value>().await.map_err(|error| ChatError::Decode {
            method: method.to_owned(),
            detail: error.to_string(),
        })?;
        let body = check_ok(method, body)?;

        Ok((string_field(&body, method, "upload_url")?, string_field(&body, method, "file_id")?))
    }
}

#[async_trait]
impl ChatClient for SlackWebClient {
    async fn reply(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), ChatError> {
        let mut payload = json!({ "channel": channel_id, "text": text });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }
        self.call("chat.postMessage", &self.bot_token, &payload).await?;
        debug!(
            event_name = "egress.slack.message_posted",
            channel_id,
            thread_id = thread_ts.unwrap_or("none"),
            "posted slack reply"
        );
        Ok(())
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        filename: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        let (upload_url, file_id) = self.upload_url(filename, content.len()).await?;

        let method = "file upload";
        let response = self
            .http
            .post(&upload_url)
            .body(content.to_owned())
            .send()
            .await
            .map_err(|error| transport(method, error))?;
        if !response.status().is_success() {
            return Err(ChatError::Api {
                method: method.to_owned(),
                error: response.status().to_string(),
            });
        }

        let mut payload = json!({
            "files": [{ "id": file_id, "title": filename }],
            "channel_id": channel_id,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }
        self.call("files.completeUploadExternal", &self.bot_token, &payload).await?;

        info!(
            event_name = "egress.slack.file_uploaded",
            channel_id,
            thread_id = thread_ts.unwrap_or("none"),
            filename,
            "uploaded result file"
        );
        Ok(())
    }
}

fn check_ok(method: &str, body: Value) -> Result<Value, ChatError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown").to_owned();
    Err(ChatError::Api { method: method.to_owned(), error })
}

fn string_field(body: &Value, method: &str, field: &str) -> Result<String, ChatError> {
    body.get(field).and_then(Value::as_str).map(str::to_owned).ok_or_else(|| ChatError::Decode {
        method: method.to_owned(),
        detail: format!("missing `{field}`"),
    })
}

fn transport(method: &str, error: impl std::fmt::Display) -> ChatError {
    ChatError::Transport { method: method.to_owned(), detail: error.to_string() }
}
