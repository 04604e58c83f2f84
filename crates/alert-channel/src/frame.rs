//! Wire frames exchanged over the alert channel.
//!
//! Every frame is a UTF-8 JSON object carrying a string `type` tag. Inbound
//! frames are decoded in two steps: the envelope is checked first, then the
//! payload is decoded according to its tag, so an unknown tag is still
//! reported by name instead of failing as malformed JSON.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::FrameError;

pub const TAG_ALERT: &str = "alert";
pub const TAG_INTEGRATION_STATUS: &str = "integration_status";
pub const TAG_PONG: &str = "pong";
pub const TAG_SUBSCRIBED: &str = "subscribed";
pub const TAG_ERROR: &str = "error";

/// Alert severity as assigned by the detection backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `alert` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    /// Unique alert identifier, also used as the desktop notification tag.
    pub alert_id: String,
    /// Tenant (client organisation) the alert belongs to.
    #[serde(default, deserialize_with = "lenient_string")]
    pub client: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Empty when the backend has no address for the alert.
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub destination_ip: String,
    /// Fields this client does not model, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AlertNotice {
    pub fn new(
        alert_id: impl Into<String>,
        client: impl Into<String>,
        title: impl Into<String>,
        risk_score: f64,
    ) -> Self {
        Self {
            alert_id: alert_id.into(),
            client: client.into(),
            title: title.into(),
            risk_score,
            severity: None,
            alert_type: None,
            timestamp: None,
            source_ip: String::new(),
            destination_ip: String::new(),
            extra: Map::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_alert_type(mut self, alert_type: impl Into<String>) -> Self {
        self.alert_type = Some(alert_type.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_addresses(
        mut self,
        source_ip: impl Into<String>,
        destination_ip: impl Into<String>,
    ) -> Self {
        self.source_ip = source_ip.into();
        self.destination_ip = destination_ip.into();
        self
    }

    pub fn source_ip(&self) -> Option<&str> {
        Some(self.source_ip.as_str()).filter(|s| !s.is_empty())
    }

    pub fn destination_ip(&self) -> Option<&str> {
        Some(self.destination_ip.as_str()).filter(|s| !s.is_empty())
    }
}

/// Payload of an `integration_status` frame.
///
/// The backend fills every field, but the client only relies on the tag, so
/// all of them are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// `inactive`, `active`, `error` or `testing` in practice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse a wire timestamp: RFC 3339 first, then an offset-less ISO 8601
/// datetime taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

// Display-only fields never reject a frame: null reads as empty, an
// unreadable timestamp reads as absent.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let timestamp = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => {
            let parsed = parse_timestamp(&raw);
            if parsed.is_none() {
                debug!(timestamp = %raw, "Ignoring unreadable timestamp");
            }
            parsed
        }
        Some(other) => {
            debug!(timestamp = %other, "Ignoring non-string timestamp");
            None
        }
    };
    Ok(timestamp)
}

/// A decoded server-to-client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Alert(AlertNotice),
    IntegrationStatus(IntegrationStatus),
    Pong { timestamp: Option<String> },
    Subscribed { message: Option<String> },
    Error { message: String },
    /// Well-formed frame with a tag this client does not handle.
    Unknown { tag: String, body: Map<String, Value> },
}

impl InboundFrame {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
        let Value::Object(mut body) = value else {
            return Err(FrameError::NotAnObject);
        };
        let tag = match body.remove("type") {
            Some(Value::String(tag)) => tag,
            _ => return Err(FrameError::MissingTag),
        };

        let frame = match tag.as_str() {
            TAG_ALERT => Self::Alert(decode_payload(&tag, body)?),
            TAG_INTEGRATION_STATUS => Self::IntegrationStatus(decode_payload(&tag, body)?),
            TAG_PONG => Self::Pong {
                timestamp: string_field(&body, "timestamp"),
            },
            TAG_SUBSCRIBED => Self::Subscribed {
                message: string_field(&body, "message"),
            },
            TAG_ERROR => Self::Error {
                message: string_field(&body, "message").unwrap_or_default(),
            },
            _ => Self::Unknown { tag, body },
        };
        Ok(frame)
    }

    /// The frame's `type` tag.
    pub fn tag(&self) -> &str {
        match self {
            Self::Alert(_) => TAG_ALERT,
            Self::IntegrationStatus(_) => TAG_INTEGRATION_STATUS,
            Self::Pong { .. } => TAG_PONG,
            Self::Subscribed { .. } => TAG_SUBSCRIBED,
            Self::Error { .. } => TAG_ERROR,
            Self::Unknown { tag, .. } => tag,
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    tag: &str,
    body: Map<String, Value>,
) -> Result<T, FrameError> {
    serde_json::from_value(Value::Object(body)).map_err(|source| FrameError::InvalidPayload {
        tag: tag.to_string(),
        source,
    })
}

fn string_field(body: &Map<String, Value>, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A client-to-server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Heartbeat; the server answers with `pong`.
    Ping { timestamp: DateTime<Utc> },
    /// Request to join the alert stream; the server answers with `subscribed`.
    Subscribe { timestamp: DateTime<Utc> },
}

impl OutboundFrame {
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now(),
        }
    }

    pub fn subscribe() -> Self {
        Self::Subscribe {
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::Subscribe { .. } => "subscribe",
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
