use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidTrackingNumber;
use crate::projection::RouteProjection;

// ─── Tracking Number ──────────────────────────────────────────────

/// Shipment key: the carrier tracking number (e.g. `UPS123456789`).
///
/// Surrounding whitespace is trimmed; the remainder must be non-empty
/// ASCII alphanumerics. Carrier-specific format rules are enforced by the
/// remote validate endpoint, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingNumber(String);

impl TrackingNumber {
    pub fn parse(raw: &str) -> Result<Self, InvalidTrackingNumber> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidTrackingNumber(raw.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TrackingNumber {
    type Err = InvalidTrackingNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TrackingNumber {
    type Error = InvalidTrackingNumber;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TrackingNumber> for String {
    fn from(value: TrackingNumber) -> Self {
        value.0
    }
}

// ─── Shipment Status ──────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ShipmentStatus {
    Pending,
    Created,
    TruckDispatched,
    PickedUp,
    InTransit,
    OutForDelivery,
    DeliveryAttempted,
    Delivered,
    Cancelled,
    Exception,
    Returned,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ShipmentStatus {
    pub const ALL: [Self; 12] = [
        Self::Pending,
        Self::Created,
        Self::TruckDispatched,
        Self::PickedUp,
        Self::InTransit,
        Self::OutForDelivery,
        Self::DeliveryAttempted,
        Self::Delivered,
        Self::Cancelled,
        Self::Exception,
        Self::Returned,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Created => "CREATED",
            Self::TruckDispatched => "TRUCK_DISPATCHED",
            Self::PickedUp => "PICKED_UP",
            Self::InTransit => "IN_TRANSIT",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::DeliveryAttempted => "DELIVERY_ATTEMPTED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Exception => "EXCEPTION",
            Self::Returned => "RETURNED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human-readable label used when an event carries no `statusDisplay`.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
            Self::TruckDispatched => "Truck Dispatched",
            Self::PickedUp => "Picked Up",
            Self::InTransit => "In Transit",
            Self::OutForDelivery => "Out for Delivery",
            Self::DeliveryAttempted => "Delivery Attempted",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Exception => "Delivery Exception",
            Self::Returned => "Returned",
            Self::Unknown => "Unknown",
        }
    }

    /// No further movement is expected once a shipment reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Returned)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Geometry ─────────────────────────────────────────────────────

/// A point on the carrier's 2D world grid.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

// ─── Connection ───────────────────────────────────────────────────

/// Lifecycle of the single shared push-channel connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Collapse to the four values consumers see (`Idle` reads as disconnected).
    pub fn status(self) -> ConnectionStatus {
        match self {
            Self::Idle | Self::Disconnected => ConnectionStatus::Disconnected,
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Connected => ConnectionStatus::Connected,
            Self::Error => ConnectionStatus::Error,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Consumer-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    /// Informational banner text for tracking views.
    pub fn indicator(self) -> &'static str {
        match self {
            Self::Connected => "Real-time updates active",
            Self::Error => "Connection failed - Using periodic updates",
            Self::Connecting | Self::Disconnected => {
                "Real-time unavailable - Using periodic updates"
            }
        }
    }
}

// ─── Events ───────────────────────────────────────────────────────

/// Which path delivered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Push,
    Poll,
}

/// An immutable fact about a shipment, from either the push channel or a
/// poll response. Optional fields left `None` do not touch the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub tracking_number: TrackingNumber,
    pub status: ShipmentStatus,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub status_display: Option<String>,
    pub comment: Option<String>,
    pub current_location: Option<Point2D>,
    pub truck_status: Option<String>,
    pub origin: Option<Point2D>,
    pub destination: Option<Point2D>,
}

impl TrackingEvent {
    /// Bare status change with no other fields.
    pub fn status_change(
        tracking_number: TrackingNumber,
        status: ShipmentStatus,
        timestamp: DateTime<Utc>,
        source: EventSource,
    ) -> Self {
        Self {
            tracking_number,
            status,
            timestamp,
            source,
            status_display: None,
            comment: None,
            current_location: None,
            truck_status: None,
            origin: None,
            destination: None,
        }
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────

/// Full current known state of one actively-viewed shipment.
///
/// Mutated only by the reconciler's merge. `origin`/`destination` stay
/// `None` until some admitted event (usually the first poll) carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentSnapshot {
    pub tracking_number: TrackingNumber,
    pub status: ShipmentStatus,
    pub status_display: String,
    pub origin: Option<Point2D>,
    pub destination: Option<Point2D>,
    pub current_location: Option<Point2D>,
    pub truck_status: Option<String>,
    pub last_comment: Option<String>,
    pub last_applied_timestamp: DateTime<Utc>,
    pub last_source: EventSource,
}

impl ShipmentSnapshot {
    /// Seed a snapshot from the first admitted event.
    pub fn from_event(event: &TrackingEvent) -> Self {
        Self {
            tracking_number: event.tracking_number.clone(),
            status: event.status,
            status_display: event
                .status_display
                .clone()
                .unwrap_or_else(|| event.status.display_name().to_owned()),
            origin: event.origin,
            destination: event.destination,
            current_location: event.current_location,
            truck_status: event.truck_status.clone(),
            last_comment: event.comment.clone(),
            last_applied_timestamp: event.timestamp,
            last_source: event.source,
        }
    }

    pub fn has_geometry(&self) -> bool {
        self.origin.is_some() && self.destination.is_some()
    }
}

/// Render-ready state handed to shipment listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentView {
    pub snapshot: ShipmentSnapshot,
    pub projection: Option<RouteProjection>,
    /// True while the status-change highlight is showing.
    pub highlighted: bool,
}

// ─── Tests ────────────────────────────────────────────────────────
