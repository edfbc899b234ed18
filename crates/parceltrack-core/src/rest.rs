//! Shipment Query Service wire DTOs and poll-result conversion.
//!
//! Endpoints (relative to the API base):
//! - `GET /tracking/{n}`          → [`ShipmentResponse`]
//! - `GET /tracking/{n}/history`  → [`HistoryResponse`]
//! - `GET /tracking/validate/{n}` → [`ValidateResponse`]
//!
//! Bodies may arrive bare or wrapped in `{success, message, data}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serde_helpers::{flexible_timestamp, flexible_timestamp_opt};
use crate::types::{EventSource, Point2D, ShipmentStatus, TrackingEvent, TrackingNumber};

// ─── Envelope ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckInfo {
    #[serde(default)]
    pub truck_id: Option<i64>,
    pub status: String,
    #[serde(default)]
    pub current_location: Option<Point2D>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentResponse {
    pub tracking_number: TrackingNumber,
    #[serde(default)]
    pub shipment_id: Option<String>,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub status_display: Option<String>,
    pub origin: Point2D,
    pub destination: Point2D,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub pickup_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_timestamp_opt")]
    pub actual_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub truck: Option<TruckInfo>,
}

// ─── History ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: ShipmentStatus,
    #[serde(default)]
    pub status_display: Option<String>,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl HistoryEntry {
    pub fn to_event(&self, tracking_number: TrackingNumber) -> TrackingEvent {
        let mut event = TrackingEvent::status_change(
            tracking_number,
            self.status,
            self.timestamp,
            EventSource::Poll,
        );
        event.status_display = self.status_display.clone();
        event.comment = non_empty(self.comment.as_deref());
        event
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub tracking_number: Option<TrackingNumber>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub total_events: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

// ─── Poll conversion ──────────────────────────────────────────────

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|c| !c.trim().is_empty()).map(str::to_owned)
}

/// Timestamp a poll result is judged by: the newest history entry, else the
/// snapshot's own update/pickup/creation time, else the Unix epoch (which any
/// previously applied event beats).
pub fn poll_timestamp(snapshot: &ShipmentResponse, history: &[HistoryEntry]) -> DateTime<Utc> {
    history
        .iter()
        .map(|h| h.timestamp)
        .max()
        .or(snapshot.updated_at)
        .or(snapshot.pickup_time)
        .or(snapshot.created_at)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Fold a snapshot + history poll into one full-field `TrackingEvent`.
pub fn poll_event(snapshot: &ShipmentResponse, history: &[HistoryEntry]) -> TrackingEvent {
    let newest = history.iter().max_by_key(|h| h.timestamp);
    let truck = snapshot.truck.as_ref();
    TrackingEvent {
        tracking_number: snapshot.tracking_number.clone(),
        status: snapshot.status,
        timestamp: poll_timestamp(snapshot, history),
        source: EventSource::Poll,
        status_display: snapshot.status_display.clone(),
        comment: newest.and_then(|h| non_empty(h.comment.as_deref())),
        current_location: truck.and_then(|t| t.current_location),
        truck_status: truck.map(|t| t.status.clone()),
        origin: Some(snapshot.origin),
        destination: Some(snapshot.destination),
    }
}
