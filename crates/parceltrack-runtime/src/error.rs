//! Runtime error types.
//!
//! `ConnectionError` never leaves the runtime: the channel task turns it
//! into a state transition. `FetchError` is reported to fetch-error
//! listeners and to direct callers of the query methods.

use std::time::Duration;

use parceltrack_core::TrackingNumber;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("shipment not found: {0}")]
    NotFound(TrackingNumber),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
    #[error("channel closed by peer")]
    Closed,
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// A failed fetch, as delivered to fetch-error listeners.
#[derive(Debug)]
pub struct FetchFailure {
    pub tracking_number: TrackingNumber,
    pub error: FetchError,
}
