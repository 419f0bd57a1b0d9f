//! Vessel-scoped queries

use std::marker::PhantomData;
use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    api::ApiRequest,
    cache::QueryKey,
    context::VesselContext,
    errors::FleetError,
    models::VesselId,
};

/// Query parameter carrying the selected vessel
pub const VESSEL_PARAM: &str = "vesselId";

/// GET of `endpoint` for whichever vessel the context currently selects.
///
/// Results are cached under `(endpoint, params, vessel id)`, so a selection
/// change naturally misses the cache and fetches fresh data.
pub struct VesselQuery<T> {
    context: Arc<VesselContext>,
    endpoint: String,
    params: Vec<(String, String)>,
    selection: watch::Receiver<Option<VesselId>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> VesselQuery<T> {
    pub fn new(context: Arc<VesselContext>, endpoint: impl Into<String>) -> Self {
        let selection = context.subscribe();
        Self {
            context,
            endpoint: endpoint.into(),
            params: Vec::new(),
            selection,
            _marker: PhantomData,
        }
    }

    /// Extra query parameter, part of the cache key
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Cache key for the current selection
    pub fn key(&self) -> Option<QueryKey> {
        let vessel_id = self.context.current_vessel_id()?;
        Some(self.key_for(vessel_id))
    }

    /// Fetch for the current vessel, served from cache when possible
    pub async fn fetch(&mut self) -> Result<T, FleetError> {
        let vessel_id = (*self.selection.borrow_and_update()).ok_or(FleetError::NoVesselSelected)?;

        let key = self.key_for(vessel_id);
        let request = self.base_request().query(VESSEL_PARAM, vessel_id);
        let url = request.url();
        debug!(url = %url, "Vessel-scoped fetch");

        let api = self.context.api();
        let value = self
            .context
            .cache()
            .get_or_fetch(key, || api.get_value(request))
            .await?;

        serde_json::from_value(value).map_err(|e| FleetError::Decode {
            method: Method::GET,
            url,
            message: e.to_string(),
        })
    }

    /// Wait until the selected vessel changes, then fetch for the new one.
    ///
    /// Fails with [`FleetError::ContextClosed`] once the context is dropped.
    pub async fn changed(&mut self) -> Result<T, FleetError> {
        self.selection
            .changed()
            .await
            .map_err(|_| FleetError::ContextClosed)?;
        self.fetch().await
    }

    fn key_for(&self, vessel_id: VesselId) -> QueryKey {
        QueryKey::vessel(self.endpoint.clone(), vessel_id).with_params(self.params.clone())
    }

    fn base_request(&self) -> ApiRequest {
        let mut request = ApiRequest::new(Method::GET, self.endpoint.clone());
        request.query = self.params.clone();
        request
    }
}
