//! Current-vessel context
//!
//! Holds which vessel is being viewed and passes vessel CRUD through to the
//! backend. The context is an explicit object handed to every vessel-scoped
//! query; nothing reads the selection from global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Method;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::{
    api::{ApiClient, ApiRequest},
    cache::{QueryCache, QueryKey},
    errors::FleetError,
    models::{NewVessel, Vessel, VesselId, VesselUpdate},
};

pub const VESSELS_ENDPOINT: &str = "/api/vessels-management";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// User-facing outcome of a write operation
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

pub struct VesselContext {
    api: ApiClient,
    cache: Arc<QueryCache>,
    selection: watch::Sender<Option<VesselId>>,
    vessels: RwLock<Vec<Vessel>>,
    changed: AtomicBool,
    notifications: broadcast::Sender<Notification>,
}

impl VesselContext {
    pub fn new(api: ApiClient, cache: Arc<QueryCache>) -> Self {
        let (selection, _) = watch::channel(None);
        let (notifications, _) = broadcast::channel(64);
        Self {
            api,
            cache,
            selection,
            vessels: RwLock::new(Vec::new()),
            changed: AtomicBool::new(false),
            notifications,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn current_vessel_id(&self) -> Option<VesselId> {
        *self.selection.borrow()
    }

    /// Receiver that observes every selection change
    pub fn subscribe(&self) -> watch::Receiver<Option<VesselId>> {
        self.selection.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub(crate) fn notify(&self, notification: Notification) {
        // No receivers is fine, nobody is listening
        let _ = self.notifications.send(notification);
    }

    /// Select a vessel. Returns false if it was already selected.
    pub async fn select_vessel(&self, id: VesselId) -> bool {
        if self.current_vessel_id() == Some(id) {
            return false;
        }
        self.switch_to(Some(id)).await;
        true
    }

    /// Returns and clears the one-shot "selection changed" flag
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Selected vessel from the last fetched list, or a placeholder if the
    /// list has not been loaded or does not contain it yet
    pub async fn current_vessel(&self) -> Option<Vessel> {
        let id = self.current_vessel_id()?;
        let vessels = self.vessels.read().await;
        Some(
            vessels
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .unwrap_or_else(|| Vessel::placeholder(id)),
        )
    }

    /// Fetch (or read from cache) the vessel list and reconcile the selection.
    ///
    /// A list that was invalidated while in flight is returned to the caller
    /// but neither stored nor used to move the selection.
    pub async fn vessels(&self) -> Result<Vec<Vessel>, FleetError> {
        let request = ApiRequest::new(Method::GET, VESSELS_ENDPOINT);
        let api = &self.api;
        let fetched = self
            .cache
            .fetch_tracked(QueryKey::global(VESSELS_ENDPOINT), || {
                api.get_value(request.clone())
            })
            .await?;

        let vessels: Vec<Vessel> =
            serde_json::from_value(fetched.value).map_err(|e| FleetError::Decode {
                method: Method::GET,
                url: request.url(),
                message: e.to_string(),
            })?;

        if !fetched.live {
            debug!(count = vessels.len(), "Discarding superseded vessel list");
            return Ok(vessels);
        }

        *self.vessels.write().await = vessels.clone();
        self.reconcile_selection(&vessels).await;
        Ok(vessels)
    }

    /// Force a re-fetch of the vessel list
    pub async fn refresh(&self) -> Result<Vec<Vessel>, FleetError> {
        self.cache.invalidate_endpoint(VESSELS_ENDPOINT).await;
        self.vessels().await
    }

    pub async fn create_vessel(&self, vessel: &NewVessel) -> Option<Vessel> {
        match self.api.post::<_, Vessel>(VESSELS_ENDPOINT, vessel).await {
            Ok(created) => {
                info!(id = %created.id, name = %created.name, "Vessel created");
                self.cache.invalidate_endpoint(VESSELS_ENDPOINT).await;
                self.notify(Notification::success(format!(
                    "Vessel {} created",
                    created.name
                )));
                Some(created)
            }
            Err(e) => {
                error!("Failed to create vessel: {}", e);
                self.notify(Notification::error(format!("Could not create vessel: {}", e)));
                None
            }
        }
    }

    pub async fn update_vessel(&self, id: VesselId, update: &VesselUpdate) -> Option<Vessel> {
        let path = format!("{}/{}", VESSELS_ENDPOINT, id);
        match self.api.patch::<_, Vessel>(&path, update).await {
            Ok(updated) => {
                info!(id = %updated.id, "Vessel updated");
                self.cache.invalidate_endpoint(VESSELS_ENDPOINT).await;
                self.notify(Notification::success(format!(
                    "Vessel {} updated",
                    updated.name
                )));
                Some(updated)
            }
            Err(e) => {
                error!(id = %id, "Failed to update vessel: {}", e);
                self.notify(Notification::error(format!("Could not update vessel: {}", e)));
                None
            }
        }
    }

    /// Delete a vessel; if it was selected, move the selection to another one
    pub async fn delete_vessel(&self, id: VesselId) -> bool {
        let path = format!("{}/{}", VESSELS_ENDPOINT, id);
        if let Err(e) = self.api.delete(&path).await {
            error!(id = %id, "Failed to delete vessel: {}", e);
            self.notify(Notification::error(format!("Could not delete vessel: {}", e)));
            return false;
        }

        info!(id = %id, "Vessel deleted");
        self.cache.invalidate_endpoint(VESSELS_ENDPOINT).await;
        self.cache.invalidate_vessel(id).await;

        let remaining = {
            let mut vessels = self.vessels.write().await;
            vessels.retain(|v| v.id != id);
            vessels.first().map(|v| v.id)
        };
        if self.current_vessel_id() == Some(id) {
            self.switch_to(remaining).await;
        }

        self.notify(Notification::success("Vessel deleted"));
        true
    }

    /// Keep the selection if it is still listed, otherwise fall back to the
    /// first vessel (or nothing for an empty list)
    async fn reconcile_selection(&self, vessels: &[Vessel]) {
        let current = self.current_vessel_id();
        if current.is_some_and(|id| vessels.iter().any(|v| v.id == id)) {
            return;
        }
        let fallback = vessels.first().map(|v| v.id);
        if fallback != current {
            if current.is_some() {
                warn!(
                    previous = ?current,
                    fallback = ?fallback,
                    "Selected vessel no longer listed, falling back"
                );
            }
            self.switch_to(fallback).await;
        }
    }

    /// Drops cached data for the previous and the new vessel, other keys are
    /// left alone
    async fn switch_to(&self, next: Option<VesselId>) {
        let previous = self.selection.send_replace(next);
        if let Some(previous) = previous {
            self.cache.invalidate_vessel(previous).await;
        }
        if let Some(next) = next {
            self.cache.invalidate_vessel(next).await;
        }
        self.changed.store(true, Ordering::Release);
        info!(previous = ?previous, current = ?next, "Vessel selection changed");
    }
}
