//! parceltrack-core: shipment tracking domain types, the push-channel
//! codec, query-service wire DTOs, and route projection math.
//! Pure library: no IO, no async.

pub mod error;
pub mod projection;
pub mod protocol;
pub mod rest;
pub mod serde_helpers;
pub mod types;

pub use error::{InvalidTrackingNumber, ProtocolError};
pub use projection::{RouteProjection, TransformedPoints, Viewport, project};
pub use protocol::{ControlMessage, ControlOp, decode_inbound};
pub use types::{
    ConnectionState, ConnectionStatus, EventSource, Point2D, ShipmentSnapshot, ShipmentStatus,
    ShipmentView, TrackingEvent, TrackingNumber,
};
