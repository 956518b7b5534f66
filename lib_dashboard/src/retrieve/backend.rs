//! # Backend API
//!
//! Typed wrappers over the backend endpoints the engine calls. Every method goes
//! through the [`ResilientClient`], so every failure is already a
//! [`RequestFailure`](crate::errors::RequestFailure) by the time it reaches here.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use crate::core::connection_manager::BackendSource;
use crate::errors::CallResult;
use crate::models::status::{BootstrapPayload, SnapshotReceipt, StatusSnapshot};
use crate::retrieve::ky_http::{CallOptions, ResilientClient};

const BOOTSTRAP_ENDPOINT: &str = "/api/bootstrap";
const SNAPSHOT_ENDPOINT: &str = "/api/laptop_camera/snapshot";
const VIOLATIONS_ENDPOINT: &str = "/api/violations";
const THEME_ENDPOINT: &str = "/api/theme";

/// A body carrying nothing but the success marker.
#[derive(Debug, Deserialize)]
struct Ack {}

/// The backend's HTTP surface.
#[derive(Clone)]
pub struct BackendApi {
    client: Arc<ResilientClient>,
    status_endpoint: String,
}

impl BackendApi {
    /// Wraps `client`; `status_endpoint` is polled while the push channel is down.
    pub fn new(client: Arc<ResilientClient>, status_endpoint: impl Into<String>) -> Self {
        Self { client, status_endpoint: status_endpoint.into() }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    /// One-shot startup snapshot.
    pub async fn bootstrap(&self) -> CallResult<BootstrapPayload> {
        self.client.call(BOOTSTRAP_ENDPOINT, CallOptions::get()).await
    }

    /// Aggregate AI, mode and signal status.
    pub async fn ai_status(&self) -> CallResult<StatusSnapshot> {
        self.client.call(&self.status_endpoint, CallOptions::get()).await
    }

    /// Asks the backend camera for a snapshot tagged with `plate`.
    pub async fn request_snapshot(&self, plate: &str) -> CallResult<SnapshotReceipt> {
        self.client
            .call(SNAPSHOT_ENDPOINT, CallOptions::post(json!({ "plate": plate })))
            .await
    }

    /// Deletes the backend copy of a violation.
    pub async fn delete_violation(&self, remote_id: &str) -> CallResult<()> {
        let endpoint = format!("{}/{}", VIOLATIONS_ENDPOINT, remote_id.trim());
        self.client.call::<Ack>(&endpoint, CallOptions::delete()).await?;
        Ok(())
    }

    /// Stores the preferred theme.
    pub async fn persist_theme(&self, name: &str) -> CallResult<()> {
        self.client
            .call::<Ack>(THEME_ENDPOINT, CallOptions::post(json!({ "theme": name })))
            .await?;
        log::info!("Theme '{}' saved.", name);
        Ok(())
    }
}

impl BackendSource for BackendApi {
    fn bootstrap(&self) -> BoxFuture<'_, CallResult<BootstrapPayload>> {
        Box::pin(BackendApi::bootstrap(self))
    }

    fn status(&self) -> BoxFuture<'_, CallResult<StatusSnapshot>> {
        Box::pin(self.ai_status())
    }

    fn delete_violation<'a>(&'a self, remote_id: &'a str) -> BoxFuture<'a, CallResult<()>> {
        Box::pin(BackendApi::delete_violation(self, remote_id))
    }
}
