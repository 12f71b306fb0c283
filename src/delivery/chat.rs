//! Chat platform REST sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::DeliverySink;
use crate::errors::{AppError, RejectReason};
use crate::models::{ChannelId, Payload};

/// Component type ids of the chat API.
const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const LINK_STYLE: u8 = 5;

/// Posts messages through the chat platform's channel message endpoint.
pub struct ChatApiSink {
    client: Client,
    api_base: String,
    token: String,
}

impl ChatApiSink {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn message_body(payload: &Payload) -> Value {
        let buttons: Vec<Value> = payload
            .buttons
            .iter()
            .map(|b| json!({ "type": BUTTON, "style": LINK_STYLE, "label": b.label, "url": b.url }))
            .collect();

        let mut body = json!({
            "embeds": [payload.embed],
            "allowed_mentions": { "parse": ["roles"] },
        });
        if !buttons.is_empty() {
            body["components"] = json!([{ "type": ACTION_ROW, "components": buttons }]);
        }
        if let Some(content) = &payload.content {
            body["content"] = json!(content);
        }
        body
    }
}

/// Map a non-success HTTP status to a rejection reason.
pub fn classify_status(status: StatusCode) -> RejectReason {
    match status {
        StatusCode::NOT_FOUND => RejectReason::DestinationGone,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => RejectReason::PermissionDenied,
        // Rate limits and server errors may succeed later
        _ => RejectReason::Transient,
    }
}

#[async_trait]
impl DeliverySink for ChatApiSink {
    #[tracing::instrument(skip(self, payload))]
    async fn deliver(&self, destination: ChannelId, payload: &Payload) -> Result<(), AppError> {
        let url = format!("{}/channels/{}/messages", self.api_base, destination);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&Self::message_body(payload))
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    RejectReason::TimedOut
                } else {
                    RejectReason::Transient
                };
                AppError::rejected(reason, format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(AppError::rejected(
            classify_status(status),
            format!("HTTP {}: {}", status.as_u16(), detail),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{Category, Release};
    use crate::render::{Branding, NotificationRenderer};

    fn payload() -> Payload {
        let renderer = NotificationRenderer::new(Branding {
            footer_text: "Apple Releases".to_string(),
            footer_icon_url: None,
        });
        let release = Release {
            category: Category::Ios,
            product: "iOS".to_string(),
            version: "17.1".to_string(),
            build_number: Some("21B74".to_string()),
            release_date: Utc::now(),
            link: "https://example.com/notes".to_string(),
        };
        let mut payload = renderer.render(&release, None, Utc::now());
        payload.content = Some("<@&9>".to_string());
        payload
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RejectReason::DestinationGone
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            RejectReason::PermissionDenied
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RejectReason::Transient
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RejectReason::Transient
        );
    }

    #[test]
    fn test_message_body_shape() {
        let body = ChatApiSink::message_body(&payload());
        assert_eq!(body["content"], "<@&9>");
        assert_eq!(body["embeds"][0]["description"], "17.1");
        assert_eq!(body["components"][0]["type"], 1);
        assert_eq!(body["components"][0]["components"][0]["style"], 5);
        assert_eq!(
            body["components"][0]["components"][0]["url"],
            "https://example.com/notes"
        );
    }

    #[tokio::test]
    async fn test_deliver_posts_to_channel() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/42/messages")
            .match_header("authorization", "Bot secret")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let sink = ChatApiSink::new(server.url(), "secret", Duration::from_secs(5)).unwrap();
        sink.deliver(42, &payload()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_to_missing_channel_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/channels/42/messages")
            .with_status(404)
            .with_body(r#"{"message": "Unknown Channel", "code": 10003}"#)
            .create_async()
            .await;

        let sink = ChatApiSink::new(server.url(), "secret", Duration::from_secs(5)).unwrap();
        let err = sink.deliver(42, &payload()).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::DeliveryRejected {
                reason: RejectReason::DestinationGone,
                ..
            }
        ));
    }
}
