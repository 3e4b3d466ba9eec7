//! Relief camp list operations.
//!
//! Camps live in a plain ordered `Vec` inside `RegistryState`; callers address them by
//! position, so any removal shifts the indices of the camps that follow.

use crate::error::RegistryError;
use crate::models::ReliefCamp;
use serde_json::Value;

pub const DEFAULT_CAMP_NAME: &str = "Emergency Shelter";

const MISSING_COORDINATES: &str = "Coordinates are required";
const INVALID_INDEX: &str = "Invalid camp index";

impl ReliefCamp {
    /// Builds a camp, rejecting falsy coordinates.
    ///
    /// A coordinate of exactly `0.0` counts as missing, so a camp on the equator or the
    /// prime meridian cannot be registered.
    pub fn new(lat: f64, lng: f64, name: Option<String>) -> Result<Self, RegistryError> {
        if !is_truthy(lat) || !is_truthy(lng) {
            return Err(RegistryError::validation(MISSING_COORDINATES));
        }
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_CAMP_NAME.to_string());
        Ok(Self { lat, lng, name })
    }
}

fn is_truthy(coord: f64) -> bool {
    coord.is_finite() && coord != 0.0
}

/// Reads a coordinate out of a loosely typed request value.
///
/// Accepts JSON numbers and numeric strings. Anything else (null, booleans, empty or
/// non-numeric strings) yields `None`.
pub fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses both coordinates and builds the camp.
pub fn camp_from_request(
    lat: Option<&Value>,
    lng: Option<&Value>,
    name: Option<String>,
) -> Result<ReliefCamp, RegistryError> {
    match (coordinate(lat), coordinate(lng)) {
        (Some(lat), Some(lng)) => ReliefCamp::new(lat, lng, name),
        _ => Err(RegistryError::validation(MISSING_COORDINATES)),
    }
}

pub fn remove_at(camps: &mut Vec<ReliefCamp>, index: i64) -> Result<ReliefCamp, RegistryError> {
    match usize::try_from(index) {
        Ok(i) if i < camps.len() => Ok(camps.remove(i)),
        _ => Err(RegistryError::index(INVALID_INDEX)),
    }
}
