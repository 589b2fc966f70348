use serde::{Deserialize, Serialize};

// Price API

#[derive(Debug, Clone, Deserialize)]
pub struct LastPriceResponse {
    #[serde(default)]
    pub lprice: String,
    pub error: Option<String>,
}

// Slack Web API

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

impl AttachmentField {
    pub fn new(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub pretext: String,
    pub text: String,
    pub color: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<AttachmentField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct SlackAck {
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionsOpenResponse {
    pub ok: bool,
    pub url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsersInfoResponse {
    pub ok: bool,
    pub user: Option<SlackUser>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub name: String,
    pub real_name: Option<String>,
}

// Slack Socket Mode

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SocketMessage {
    #[serde(rename = "hello")]
    Hello,
    #[serde(rename = "events_api")]
    EventsApi {
        envelope_id: String,
        /// Decoded separately so a bad event never blocks the ack.
        payload: serde_json::Value,
    },
    #[serde(rename = "disconnect")]
    Disconnect { reason: Option<String> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct EventsApiPayload {
    pub event: SlackEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SlackEvent {
    #[serde(rename = "app_mention")]
    AppMention(MentionEvent),
    #[serde(other)]
    Other,
}

/// Inbound mention of the bot.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MentionEvent {
    pub user: String,
    pub text: String,
    pub channel: String,
}

#[derive(Debug, Serialize)]
pub struct SocketAck<'a> {
    pub envelope_id: &'a str,
}

// Market history and chart rendering

#[derive(Debug, Deserialize)]
pub struct MarketChartResponse {
    pub prices: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartCreateRequest {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f64,
    pub format: String,
    pub background_color: String,
    pub chart: String,
}

#[derive(Debug, Deserialize)]
pub struct ChartCreateResponse {
    pub success: Option<bool>,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_app_mention_envelope() {
        let raw = r#"{
            "envelope_id": "57d6a792-4d35-4d0b-b6aa-3361493e1caf",
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": {
                "type": "event_callback",
                "event": {
                    "type": "app_mention",
                    "user": "U061F7AUR",
                    "text": "<@U0LAN0Z89> setHigh btc 50000",
                    "ts": "1515449522.000016",
                    "channel": "C123ABC456"
                }
            }
        }"#;

        match serde_json::from_str::<SocketMessage>(raw).unwrap() {
            SocketMessage::EventsApi { envelope_id, payload } => {
                assert_eq!(envelope_id, "57d6a792-4d35-4d0b-b6aa-3361493e1caf");
                let payload: EventsApiPayload = serde_json::from_value(payload).unwrap();
                match payload.event {
                    SlackEvent::AppMention(ev) => {
                        assert_eq!(ev.user, "U061F7AUR");
                        assert_eq!(ev.channel, "C123ABC456");
                    }
                    SlackEvent::Other => panic!("expected app_mention"),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_control_messages() {
        let hello = r#"{"type":"hello","num_connections":1,"debug_info":{"host":"x"}}"#;
        assert!(matches!(serde_json::from_str::<SocketMessage>(hello).unwrap(), SocketMessage::Hello));

        let bye = r#"{"type":"disconnect","reason":"refresh_requested"}"#;
        assert!(matches!(
            serde_json::from_str::<SocketMessage>(bye).unwrap(),
            SocketMessage::Disconnect { reason: Some(_) }
        ));

        let other = r#"{"type":"slash_commands","envelope_id":"x"}"#;
        assert!(matches!(serde_json::from_str::<SocketMessage>(other).unwrap(), SocketMessage::Unknown));
    }

    #[test]
    fn attachment_omits_empty_optionals() {
        let a = Attachment {
            pretext: "p".into(),
            text: "t".into(),
            color: "#fff".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&a).unwrap();
        assert!(json.get("image_url").is_none());
        assert!(json.get("fields").is_none());
    }
}
