//! Data models.
//!
//! Every response body is decoded into one of these types before it reaches
//! callers; a body that does not fit is rejected at the API boundary.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FleetError;

/// Backend identifier of a vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct VesselId(i64);

impl TryFrom<i64> for VesselId {
    type Error = FleetError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(FleetError::InvalidVesselId(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for VesselId {
    type Error = FleetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = value
            .trim()
            .parse::<i64>()
            .map_err(|_| FleetError::InvalidVesselId(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl From<VesselId> for i64 {
    fn from(id: VesselId) -> Self {
        id.0
    }
}

impl VesselId {
    /// Get the raw id value
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last reported position of a vessel
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    /// Latitude in WGS84 decimal degrees
    pub latitude: f64,
    /// Longitude in WGS84 decimal degrees
    pub longitude: f64,
    /// Heading in degrees
    pub heading: Option<f64>,
    /// Speed over ground in knots
    pub speed: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A tracked vessel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "VesselRecord")]
pub struct Vessel {
    pub id: VesselId,
    pub name: String,
    pub vessel_type: Option<String>,
    /// Length overall in metres
    pub length: Option<f64>,
    pub registration: Option<String>,
    /// None unless both coordinates are present and in range
    pub telemetry: Option<Telemetry>,
}

impl Vessel {
    /// Stand-in for a selected vessel whose record has not been loaded yet
    pub fn placeholder(id: VesselId) -> Self {
        Self {
            id,
            name: String::new(),
            vessel_type: None,
            length: None,
            registration: None,
            telemetry: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty() && self.vessel_type.is_none() && self.telemetry.is_none()
    }
}

/// Wire shape of a vessel, telemetry fields flattened
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VesselRecord {
    id: VesselId,
    name: String,
    #[serde(rename = "type", default)]
    vessel_type: Option<String>,
    #[serde(default)]
    length: Option<f64>,
    #[serde(default)]
    registration: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default, alias = "lastUpdated")]
    timestamp: Option<DateTime<Utc>>,
}

impl From<VesselRecord> for Vessel {
    fn from(record: VesselRecord) -> Self {
        let telemetry = match (record.latitude, record.longitude) {
            (Some(lat), Some(lon))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
            {
                Some(Telemetry {
                    latitude: lat,
                    longitude: lon,
                    heading: record.heading,
                    speed: record.speed,
                    timestamp: record.timestamp,
                })
            }
            _ => None,
        };

        Self {
            id: record.id,
            name: record.name,
            vessel_type: record.vessel_type,
            length: record.length,
            registration: record.registration,
            telemetry,
        }
    }
}

/// Payload for creating a vessel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVessel {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub vessel_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
}

/// Partial update of a vessel, unset fields are left untouched
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub vessel_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
}

/// A point within a voyage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub id: i64,
    pub voyage_id: i64,
    /// Position in the voyage, authoritative over list order
    pub order_index: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Planned speed in knots
    #[serde(default)]
    pub planned_speed: Option<f64>,
    #[serde(default)]
    pub engine_rpm: Option<u32>,
    /// Distance from the previous waypoint in nautical miles
    #[serde(default)]
    pub leg_distance: Option<f64>,
    /// Leg duration in hours
    #[serde(default)]
    pub leg_duration: Option<f64>,
    /// Leg fuel in litres
    #[serde(default)]
    pub leg_fuel: Option<f64>,
}

/// Partial update of a waypoint's planning data
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_rpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_speed: Option<f64>,
}

/// Voyage totals as computed by the backend
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoyageCalculation {
    pub total_distance: f64,
    pub total_fuel_consumption: f64,
    #[serde(default)]
    pub total_duration: Option<f64>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

/// A bank transaction; positive amounts are money in
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
}
