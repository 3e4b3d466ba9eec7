//! Emergency alerts for contacts of a reporting device.
//!
//! The registry only provides the report snapshot; composing the text and handing it to a
//! delivery backend happens here. The shipped backend (`LogSink`) records alerts in the log.

use crate::config::AlertConf;
use crate::error::NotifyError;
use crate::models::EmergencyReport;
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;

const UNKNOWN: &str = "Unknown";

/// Body of `/sendEmails`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertRequest {
    #[serde(default)]
    pub emails: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "deviceId", default)]
    pub device_id: Option<String>,
}

impl AlertRequest {
    /// Checks recipients then message, returning the recipient list.
    pub fn validate(&self) -> Result<Vec<String>, NotifyError> {
        let recipients: Vec<String> = match &self.emails {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        if recipients.is_empty() {
            return Err(NotifyError::Validation("Emails array is required".into()));
        }
        if self.message.as_deref().map_or(true, str::is_empty) {
            return Err(NotifyError::Validation("Message is required".into()));
        }
        Ok(recipients)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub subject: String,
    pub recipients: Vec<String>,
    pub body: String,
}

impl Alert {
    /// Builds the alert text; missing report fields read as `Unknown`.
    pub fn compose(
        conf: &AlertConf,
        recipients: Vec<String>,
        message: &str,
        device_id: Option<&str>,
        report: Option<&EmergencyReport>,
    ) -> Self {
        let fields = report.map(|r| &r.fields);
        let text = |v: Option<&String>| v.cloned().unwrap_or_else(|| UNKNOWN.into());
        let number = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_else(|| UNKNOWN.into());

        let age = match fields.and_then(|f| f.age.as_ref()) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => UNKNOWN.into(),
            Some(other) => other.to_string(),
        };
        let timestamp = report
            .and_then(|r| r.timestamp.format(&Rfc3339).ok())
            .unwrap_or_else(|| UNKNOWN.into());
        let tracking_url = format!(
            "{}/admin?id={}",
            conf.tracking_base_url.trim_end_matches('/'),
            device_id.unwrap_or_default()
        );

        let body = format!(
            "{message}\n\n\
             Name: {name}\n\
             Age: {age}\n\
             Gender: {gender}\n\
             Device ID: {device}\n\
             Location: {lat}, {lon}\n\
             Accuracy: {accuracy} m\n\
             Timestamp: {timestamp}\n\n\
             Track the user's location here: {tracking_url}\n",
            name = text(fields.and_then(|f| f.name.as_ref())),
            gender = text(fields.and_then(|f| f.gender.as_ref())),
            device = device_id.unwrap_or(UNKNOWN),
            lat = number(fields.and_then(|f| f.lat)),
            lon = number(fields.and_then(|f| f.lon)),
            accuracy = number(fields.and_then(|f| f.accuracy)),
        );

        Self { subject: conf.subject.clone(), recipients, body }
    }
}

/// Delivery backend for composed alerts.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        tracing::info!(
            subject = %alert.subject,
            recipients = alert.recipients.len(),
            body = %alert.body,
            "alert dispatched"
        );
        Ok(())
    }
}
