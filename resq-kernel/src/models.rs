use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Status value that withdraws a device's report instead of storing it.
pub const STATUS_CLEAR: &str = "CLEAR";

/// Payload a device submits along with its id.
///
/// Known keys are typed. A known key holding a value of another JSON type is not
/// rejected: it stays in `extra` under its own name, like any unknown key, and is
/// written back out verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Forms send this either as a number or as free text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_manual: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReportFields {
    pub fn is_clear(&self) -> bool {
        self.status.as_deref() == Some(STATUS_CLEAR)
    }

    /// Splits a raw JSON object into typed fields and the leftover bucket.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut fields = Self {
            status: take(&mut map, "status"),
            name: take(&mut map, "name"),
            age: None,
            gender: take(&mut map, "gender"),
            lat: take(&mut map, "lat"),
            lon: take(&mut map, "lon"),
            accuracy: take(&mut map, "accuracy"),
            is_manual: take(&mut map, "isManual"),
            extra: Map::new(),
        };
        fields.age = map.remove("age").filter(|v| !v.is_null());
        fields.extra = map;
        fields
    }
}

/// Removes `key` when it decodes as `T`; a mistyped value is left in `map`.
fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    match map.get(key) {
        Some(Value::Null) => {
            map.remove(key);
            None
        }
        Some(value) => {
            let typed = T::deserialize(value).ok()?;
            map.remove(key);
            Some(typed)
        }
        None => None,
    }
}

impl<'de> Deserialize<'de> for ReportFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_map)
    }
}

/// Body of `/update` and of each `/updateAdminMap` entry.
///
/// Device ids are opaque: JSON strings are used as is, numbers by their text.
#[derive(Debug, Clone, Default)]
pub struct ReportSubmission {
    pub device_id: Option<String>,
    pub fields: ReportFields,
}

impl ReportSubmission {
    pub fn new(device_id: impl Into<String>, fields: ReportFields) -> Self {
        Self { device_id: Some(device_id.into()), fields }
    }

    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let device_id = match map.remove("deviceId") {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self { device_id, fields: ReportFields::from_map(map) }
    }

    /// Decodes one loosely typed entry. Anything but an object yields a submission
    /// without device id, which the registry skips or rejects.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Self::default(),
        }
    }
}

impl<'de> Deserialize<'de> for ReportSubmission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(flatten)]
    pub fields: ReportFields,
    /// Set by the registry on every insert, never by the caller.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliefCamp {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

pub type EmergenciesMap = HashMap<String, EmergencyReport>;

/// Everything the kernel persists, as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryState {
    pub emergencies: EmergenciesMap,
    pub relief_camps: Vec<ReliefCamp>,
}
