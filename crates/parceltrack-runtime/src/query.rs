//! Shipment Query Service client.
//!
//! `ShipmentQuery` is the seam the service polls through; tests swap in
//! an in-memory implementation.

use std::future::Future;

use parceltrack_core::rest::{
    Envelope, HistoryEntry, HistoryResponse, ShipmentResponse, ValidateResponse, poll_event,
};
use parceltrack_core::{TrackingEvent, TrackingNumber};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::FetchError;

pub trait ShipmentQuery: Send + Sync + 'static {
    /// `GET /tracking/{n}`
    fn fetch_snapshot(
        &self,
        id: &TrackingNumber,
    ) -> impl Future<Output = Result<ShipmentResponse, FetchError>> + Send;

    /// `GET /tracking/{n}/history`, oldest first. Empty when none recorded.
    fn fetch_history(
        &self,
        id: &TrackingNumber,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, FetchError>> + Send;

    /// `GET /tracking/validate/{n}`
    fn validate(&self, id: &TrackingNumber)
    -> impl Future<Output = Result<bool, FetchError>> + Send;
}

/// Snapshot + history folded into one poll event.
pub async fn fetch_poll_event<Q: ShipmentQuery>(
    query: &Q,
    id: &TrackingNumber,
) -> Result<TrackingEvent, FetchError> {
    let snapshot = query.fetch_snapshot(id).await?;
    let history = query.fetch_history(id).await?;
    Ok(poll_event(&snapshot, &history))
}

// ─── HTTP ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpShipmentQuery {
    http: Client,
    base_url: String,
}

impl HttpShipmentQuery {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET and unwrap the optional envelope. `Ok(None)` on 404.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, FetchError> {
        let res = self.http.get(self.url(path)).send().await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::UnexpectedStatus { status, body });
        }
        let bytes = res.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        Ok(Some(envelope.into_inner()))
    }
}

impl ShipmentQuery for HttpShipmentQuery {
    async fn fetch_snapshot(&self, id: &TrackingNumber) -> Result<ShipmentResponse, FetchError> {
        self.get(&format!("/tracking/{id}"))
            .await?
            .ok_or_else(|| FetchError::NotFound(id.clone()))
    }

    async fn fetch_history(&self, id: &TrackingNumber) -> Result<Vec<HistoryEntry>, FetchError> {
        let history: Option<HistoryResponse> = self.get(&format!("/tracking/{id}/history")).await?;
        Ok(history.map(|h| h.history).unwrap_or_default())
    }

    async fn validate(&self, id: &TrackingNumber) -> Result<bool, FetchError> {
        let resp: Option<ValidateResponse> = self.get(&format!("/tracking/validate/{id}")).await?;
        Ok(resp.is_some_and(|v| v.valid))
    }
}
