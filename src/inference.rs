//! Request/response client for the remote reasoning service

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::{DeviceAction, InferenceReply, Utterance};
use crate::{Error, Result};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote reasoning backend
///
/// Implementations never retry; every failure is reported once and the
/// caller decides what to do with it.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Ask the backend for a reply to an utterance
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure or a non-success
    /// status, [`Error::Protocol`] if the reply body cannot be interpreted
    async fn infer(&self, utterance: &Utterance) -> Result<InferenceReply>;
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct InferenceResponse {
    response: String,
    #[serde(default)]
    action: Option<String>,
}

impl From<InferenceResponse> for InferenceReply {
    fn from(body: InferenceResponse) -> Self {
        let action = body.action.as_deref().and_then(|raw| {
            let parsed = DeviceAction::parse(raw);
            if parsed.is_none() {
                tracing::warn!(action = raw, "ignoring unrecognised action in reply");
            }
            parsed
        });

        Self {
            text: body.response,
            action,
        }
    }
}

/// Parse a raw reply body
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the body is not `{response, action?}`
pub fn parse_reply(body: &str) -> Result<InferenceReply> {
    serde_json::from_str::<InferenceResponse>(body)
        .map(InferenceReply::from)
        .map_err(|e| Error::Protocol(format!("malformed reply body: {e}")))
}

/// Inference over HTTP with a JSON body
pub struct HttpInferenceClient {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpInferenceClient {
    /// Create a client for the given endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: url::Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, url })
    }

    /// Endpoint this client posts to
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer(&self, utterance: &Utterance) -> Result<InferenceReply> {
        tracing::debug!(url = %self.url, chars = utterance.text().len(), "sending inference request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&InferenceRequest {
                input: utterance.text(),
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "inference request failed");
                Error::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "inference backend error");
            return Err(Error::Network(format!("inference backend returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read reply body: {e}")))?;

        let reply = parse_reply(&body)?;
        tracing::info!(action = ?reply.action, "inference reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_with_action() {
        let reply = parse_reply(r#"{"response":"Turning it on","action":"turn_on"}"#).unwrap();
        assert_eq!(reply.text, "Turning it on");
        assert_eq!(reply.action, Some(DeviceAction::TurnOn));
    }

    #[test]
    fn test_parse_reply_without_action() {
        let reply = parse_reply(r#"{"response":"It is sunny"}"#).unwrap();
        assert_eq!(reply.action, None);

        let reply = parse_reply(r#"{"response":"ok","action":null}"#).unwrap();
        assert_eq!(reply.action, None);
    }

    #[test]
    fn test_parse_reply_unknown_action_is_dropped() {
        let reply = parse_reply(r#"{"response":"ok","action":"explode"}"#).unwrap();
        assert_eq!(reply.text, "ok");
        assert_eq!(reply.action, None);
    }

    #[test]
    fn test_parse_reply_rejects_malformed_body() {
        assert!(matches!(parse_reply("not json"), Err(Error::Protocol(_))));
        assert!(matches!(parse_reply(r#"{"text":"x"}"#), Err(Error::Protocol(_))));
        assert!(matches!(parse_reply(r#"{"response":42}"#), Err(Error::Protocol(_))));
    }
}
