//! Push-channel wire messages.
//!
//! Outbound: `{"op":"subscribe"|"unsubscribe","trackingNumber":"…"}`.
//! Inbound:  `{"type":"shipment-changed","trackingNumber":"…","status":"…",
//! "timestamp":…, ...optional fields}`. Each message stands alone; the
//! channel carries no per-connection protocol state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::serde_helpers::flexible_timestamp;
use crate::types::{EventSource, Point2D, ShipmentStatus, TrackingEvent, TrackingNumber};

/// Inbound type tag for shipment change notifications.
pub const SHIPMENT_CHANGED: &str = "shipment-changed";

// ─── Outbound ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlOp {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub op: ControlOp,
    pub tracking_number: TrackingNumber,
}

impl ControlMessage {
    pub fn subscribe(tracking_number: TrackingNumber) -> Self {
        Self {
            op: ControlOp::Subscribe,
            tracking_number,
        }
    }

    pub fn unsubscribe(tracking_number: TrackingNumber) -> Self {
        Self {
            op: ControlOp::Unsubscribe,
            tracking_number,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─── Inbound ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentChanged {
    tracking_number: TrackingNumber,
    status: ShipmentStatus,
    #[serde(deserialize_with = "flexible_timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    status_display: Option<String>,
    #[serde(default)]
    current_location: Option<Point2D>,
    #[serde(default)]
    truck_status: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

impl From<ShipmentChanged> for TrackingEvent {
    fn from(msg: ShipmentChanged) -> Self {
        Self {
            tracking_number: msg.tracking_number,
            status: msg.status,
            timestamp: msg.timestamp,
            source: EventSource::Push,
            status_display: msg.status_display,
            comment: msg.comment,
            current_location: msg.current_location,
            truck_status: msg.truck_status,
            origin: None,
            destination: None,
        }
    }
}

/// Decode one inbound text frame into a push `TrackingEvent`.
pub fn decode_inbound(raw: &str) -> Result<TrackingEvent, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if kind != SHIPMENT_CHANGED {
        return Err(ProtocolError::Unsupported(kind.to_owned()));
    }
    let msg: ShipmentChanged = serde_json::from_value(value)?;
    Ok(msg.into())
}
