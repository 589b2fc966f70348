use crate::types::{
    Attachment, ConnectionsOpenResponse, EventsApiPayload, MentionEvent, PostMessageRequest,
    SlackAck, SlackEvent, SocketAck, SocketMessage, UsersInfoResponse,
};
use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 60;

/// Thin Slack Web API client.
pub struct SlackClient {
    client: Client,
    api_url: String,
    bot_token: String,
    app_token: String,
}

impl SlackClient {
    pub fn new(api_url: &str, bot_token: &str, app_token: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            app_token: app_token.to_string(),
        }
    }

    pub async fn post_message(&self, channel: &str, attachment: Attachment) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_url);
        let body = PostMessageRequest {
            channel,
            attachments: vec![attachment],
        };

        let ack: SlackAck = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .context("chat.postMessage request failed")?
            .json()
            .await
            .context("Malformed chat.postMessage response")?;

        if !ack.ok {
            return Err(anyhow!(
                "chat.postMessage rejected: {}",
                ack.error.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        Ok(())
    }

    /// Display name for a user id.
    pub async fn user_name(&self, user_id: &str) -> Result<String> {
        let url = format!("{}/users.info", self.api_url);
        let resp: UsersInfoResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.bot_token)
            .query(&[("user", user_id)])
            .send()
            .await
            .context("users.info request failed")?
            .json()
            .await
            .context("Malformed users.info response")?;

        match resp.user {
            Some(user) if resp.ok => Ok(user.real_name.filter(|n| !n.is_empty()).unwrap_or(user.name)),
            _ => Err(anyhow!(
                "users.info failed for {}: {}",
                user_id,
                resp.error.unwrap_or_else(|| "unknown error".to_string())
            )),
        }
    }

    /// Fresh Socket Mode websocket URL. Each URL is single use.
    pub async fn open_socket_url(&self) -> Result<String> {
        let url = format!("{}/apps.connections.open", self.api_url);
        let resp: ConnectionsOpenResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.app_token)
            .send()
            .await
            .context("apps.connections.open request failed")?
            .json()
            .await
            .context("Malformed apps.connections.open response")?;

        match resp.url {
            Some(url) if resp.ok => Ok(url),
            _ => Err(anyhow!(
                "apps.connections.open failed: {}",
                resp.error.unwrap_or_else(|| "unknown error".to_string())
            )),
        }
    }
}

/// Keeps a Socket Mode connection alive and forwards every app mention into
/// the event mailbox.
pub struct SocketModeListener {
    slack: Arc<SlackClient>,
    events: mpsc::Sender<MentionEvent>,
}

impl SocketModeListener {
    pub fn new(slack: Arc<SlackClient>, events: mpsc::Sender<MentionEvent>) -> Self {
        Self { slack, events }
    }

    pub async fn run(&self) {
        let mut backoff: u64 = 1;

        loop {
            match self.slack.open_socket_url().await {
                Ok(url) => {
                    info!("Connecting to Slack Socket Mode");
                    match connect_async(url.as_str()).await {
                        Ok((ws_stream, _)) => {
                            info!("Socket Mode connected");
                            backoff = 1;

                            let (mut write, mut read) = ws_stream.split();
                            let mut ping_interval = tokio::time::interval(Duration::from_secs(30));

                            loop {
                                tokio::select! {
                                    _ = ping_interval.tick() => {
                                        if let Err(e) = write.send(Message::Ping(vec![])).await {
                                            error!("Failed to send Ping: {}", e);
                                            break;
                                        }
                                    }
                                    msg = read.next() => {
                                        match msg {
                                            Some(Ok(Message::Text(text))) => {
                                                match self.handle_message(&text).await {
                                                    Ok(Some(reply)) => {
                                                        if let Err(e) = write.send(Message::Text(reply)).await {
                                                            error!("Failed to ack envelope: {}", e);
                                                            break;
                                                        }
                                                    }
                                                    Ok(None) => {}
                                                    Err(e) => {
                                                        warn!("Reconnecting: {}", e);
                                                        break;
                                                    }
                                                }
                                            }
                                            Some(Ok(Message::Ping(payload))) => {
                                                if let Err(e) = write.send(Message::Pong(payload)).await {
                                                    error!("Failed to send Pong: {}", e);
                                                    break;
                                                }
                                            }
                                            Some(Ok(Message::Pong(_))) => debug!("Received Pong"),
                                            Some(Ok(Message::Close(frame))) => {
                                                warn!("Socket closed by Slack: {:?}", frame);
                                                break;
                                            }
                                            Some(Ok(_)) => {}
                                            Some(Err(e)) => {
                                                error!("Socket read error: {}", e);
                                                break;
                                            }
                                            None => {
                                                warn!("Socket stream ended");
                                                break;
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        Err(e) => error!("Socket Mode connection failed: {}", e),
                    }
                }
                Err(e) => error!("Could not open Socket Mode URL: {:#}", e),
            }

            warn!("Reconnecting in {}s...", backoff);
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = next_backoff(backoff);
        }
    }

    /// Returns the ack frame to send back, if any. An error means the
    /// connection should be dropped and reopened.
    ///
    /// Every `events_api` envelope is acked once its id is known, even when
    /// the event inside cannot be decoded, so Slack never redelivers it.
    async fn handle_message(&self, text: &str) -> Result<Option<String>> {
        match serde_json::from_str::<SocketMessage>(text) {
            Ok(SocketMessage::Hello) => {
                debug!("Socket Mode hello");
                Ok(None)
            }
            Ok(SocketMessage::EventsApi { envelope_id, payload }) => {
                let ack = serde_json::to_string(&SocketAck {
                    envelope_id: &envelope_id,
                })?;
                match serde_json::from_value::<EventsApiPayload>(payload) {
                    Ok(EventsApiPayload {
                        event: SlackEvent::AppMention(event),
                    }) => {
                        if self.events.send(event).await.is_err() {
                            return Err(anyhow!("event mailbox closed"));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(envelope_id = %envelope_id, "Ignoring undecodable event: {}", e),
                }
                Ok(Some(ack))
            }
            Ok(SocketMessage::Disconnect { reason }) => Err(anyhow!(
                "Slack requested disconnect ({})",
                reason.unwrap_or_default()
            )),
            Ok(SocketMessage::Unknown) => Ok(None),
            Err(e) => {
                error!("Failed to parse socket message: {} | Text: {}", e, text);
                Ok(None)
            }
        }
    }
}

fn next_backoff(secs: u64) -> u64 {
    secs.saturating_mul(2).min(MAX_BACKOFF_SECS)
}
