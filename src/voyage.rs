//! Voyage leg calculation and planning

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{error, info};

use crate::{
    api::ApiRequest,
    cache::QueryKey,
    context::{Notification, VesselContext},
    errors::FleetError,
    models::{VoyageCalculation, Waypoint, WaypointUpdate},
};

/// Mean Earth radius in nautical miles
const EARTH_RADIUS_NM: f64 = 3440.065;

/// Engine fuel burn by RPM.
///
/// Points are `(rpm, litres per hour)`; rates between points are linearly
/// interpolated and clamped to the first and last point outside the range.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelCurve {
    points: Vec<(u32, f64)>,
}

impl FuelCurve {
    pub fn new(mut points: Vec<(u32, f64)>) -> Result<Self, FleetError> {
        if points.is_empty() {
            return Err(FleetError::ConfigurationError {
                message: "Fuel curve needs at least one point".to_string(),
            });
        }
        if points.iter().any(|(_, rate)| !rate.is_finite() || *rate < 0.0) {
            return Err(FleetError::ConfigurationError {
                message: "Fuel rates must be finite and non-negative".to_string(),
            });
        }
        points.sort_by_key(|(rpm, _)| *rpm);
        points.dedup_by_key(|(rpm, _)| *rpm);
        Ok(Self { points })
    }

    /// Litres per hour at `rpm`
    pub fn rate(&self, rpm: u32) -> f64 {
        let (first_rpm, first_rate) = self.points[0];
        if rpm <= first_rpm {
            return first_rate;
        }
        for window in self.points.windows(2) {
            let (lo_rpm, lo_rate) = window[0];
            let (hi_rpm, hi_rate) = window[1];
            if rpm <= hi_rpm {
                let t = (rpm - lo_rpm) as f64 / (hi_rpm - lo_rpm) as f64;
                return lo_rate + t * (hi_rate - lo_rate);
            }
        }
        self.points[self.points.len() - 1].1
    }
}

impl Default for FuelCurve {
    /// Generic twin-diesel motor yacht profile
    fn default() -> Self {
        Self {
            points: vec![
                (600, 8.0),
                (1000, 25.0),
                (1400, 55.0),
                (1800, 95.0),
                (2200, 150.0),
                (2400, 185.0),
            ],
        }
    }
}

/// Segment between two consecutive waypoints
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub from_waypoint: i64,
    pub to_waypoint: i64,
    /// Nautical miles
    pub distance: f64,
    /// Hours, None without a usable planned speed
    pub duration: Option<f64>,
    /// Litres, None without duration or engine RPM
    pub fuel: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoyageSummary {
    pub legs: Vec<Leg>,
    pub total_distance: f64,
    /// Sum over legs with a computable duration
    pub total_duration: f64,
    /// Sum over legs with computable fuel
    pub total_fuel: f64,
    /// Every leg has both duration and fuel, so the totals cover the route
    pub complete: bool,
}

/// Great-circle distance in nautical miles
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Compute per-leg and total metrics.
///
/// The first waypoint (by `order_index`) is the origin and has no leg.
/// Fewer than two waypoints give an empty summary.
pub fn calculate(waypoints: &[Waypoint], curve: &FuelCurve) -> VoyageSummary {
    let mut ordered: Vec<&Waypoint> = waypoints.iter().collect();
    ordered.sort_by_key(|wp| wp.order_index);

    let legs: Vec<Leg> = ordered
        .windows(2)
        .map(|pair| {
            let (prev, wp) = (pair[0], pair[1]);
            let distance = wp.leg_distance.unwrap_or_else(|| {
                haversine_nm(prev.latitude, prev.longitude, wp.latitude, wp.longitude)
            });
            let duration = wp
                .planned_speed
                .filter(|speed| speed.is_finite() && *speed > 0.0)
                .map(|speed| distance / speed);
            let fuel = duration
                .zip(wp.engine_rpm)
                .map(|(hours, rpm)| hours * curve.rate(rpm));
            Leg {
                from_waypoint: prev.id,
                to_waypoint: wp.id,
                distance,
                duration,
                fuel,
            }
        })
        .collect();

    VoyageSummary {
        total_distance: legs.iter().map(|l| l.distance).sum(),
        complete: legs
            .iter()
            .all(|l| l.duration.is_some() && l.fuel.is_some()),
        total_duration: legs.iter().filter_map(|l| l.duration).sum(),
        total_fuel: legs.iter().filter_map(|l| l.fuel).sum(),
        legs,
    }
}

/// Server-side totals of one voyage, kept current across waypoint edits
pub struct VoyagePlanner {
    context: Arc<VesselContext>,
    voyage_id: i64,
    totals: Option<VoyageCalculation>,
}

impl VoyagePlanner {
    pub fn new(context: Arc<VesselContext>, voyage_id: i64) -> Self {
        Self {
            context,
            voyage_id,
            totals: None,
        }
    }

    pub fn voyage_id(&self) -> i64 {
        self.voyage_id
    }

    fn calculate_endpoint(&self) -> String {
        format!("/api/voyages/{}/calculate", self.voyage_id)
    }

    /// Last successfully fetched totals
    pub fn totals(&self) -> Option<&VoyageCalculation> {
        self.totals.as_ref()
    }

    /// Fetch totals; on failure the previous totals are kept
    pub async fn load(&mut self) -> Result<&VoyageCalculation, FleetError> {
        let endpoint = self.calculate_endpoint();
        let request = ApiRequest::new(Method::GET, endpoint.clone());
        let api = self.context.api();
        let value = self
            .context
            .cache()
            .get_or_fetch(QueryKey::global(endpoint.clone()), || {
                api.get_value(request)
            })
            .await?;

        let totals: VoyageCalculation =
            serde_json::from_value(value).map_err(|e| FleetError::Decode {
                method: Method::GET,
                url: endpoint,
                message: e.to_string(),
            })?;
        Ok(self.totals.insert(totals))
    }

    /// Set a waypoint's engine RPM and refresh the totals.
    ///
    /// Returns true only if both the update and the refresh succeeded.
    pub async fn set_engine_rpm(&mut self, waypoint_id: i64, rpm: u32) -> bool {
        let path = format!("/api/waypoints/{}", waypoint_id);
        let update = WaypointUpdate {
            engine_rpm: Some(rpm),
            planned_speed: None,
        };

        if let Err(e) = self.context.api().patch::<_, Value>(&path, &update).await {
            error!(waypoint_id, rpm, "Failed to update engine RPM: {}", e);
            self.context.notify(Notification::error(format!(
                "Could not update engine RPM: {}",
                e
            )));
            return false;
        }
        info!(waypoint_id, rpm, "Engine RPM updated");

        self.context
            .cache()
            .invalidate_endpoint(&self.calculate_endpoint())
            .await;

        let refreshed = self.load().await.map(|_| ());
        match refreshed {
            Ok(()) => {
                self.context
                    .notify(Notification::success("Voyage recalculated"));
                true
            }
            Err(e) => {
                self.context.notify(Notification::error(format!(
                    "Could not recalculate voyage: {}",
                    e
                )));
                false
            }
        }
    }

    /// Recompute legs locally from the last fetched waypoints
    pub fn summary(&self, curve: &FuelCurve) -> Option<VoyageSummary> {
        self.totals
            .as_ref()
            .map(|totals| calculate(&totals.waypoints, curve))
    }
}
