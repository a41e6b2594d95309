use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Scheduled,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Text,
    Image,
    Flex,
}

/// One queued unit of outbound communication. Status only ever advances
/// `scheduled -> sent` or `scheduled -> failed`, never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub id: Uuid,
    pub target: String,
    pub msg_type: MsgType,
    pub message: Option<String>,
    pub image_url: Option<String>,
    pub flex_json: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: BroadcastStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audience selector parsed from `BroadcastMessage.target`. Anything that
/// does not match a known shape resolves to an empty audience rather than an
/// error, so a malformed broadcast can still be finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDescriptor {
    All,
    Segment(String),
    Tag(String),
    Unknown,
}

impl TargetDescriptor {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "all" {
            return Self::All;
        }
        if let Some(id) = raw.strip_prefix("segment:") {
            return Self::Segment(id.to_string());
        }
        if let Some(tag) = raw.strip_prefix("tag:") {
            return Self::Tag(tag.to_string());
        }
        Self::Unknown
    }
}

/// Outbound payload in the push API's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePayload {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        original_content_url: String,
        preview_image_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Flex {
        alt_text: String,
        contents: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub recipient_id: String,
    pub error: String,
}

/// Settled per-recipient outcome of one broadcast. Exposed for logging and
/// metrics; the message status does not depend on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<DeliveryFailure>,
}
