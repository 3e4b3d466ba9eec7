//! Emergency registry: active SOS reports and relief camps, write-through to disk.
//!
//! One `RwLock` guards the whole `RegistryState`. Mutations take the write guard,
//! change the state, then downgrade to a read guard while the document is saved, so
//! saves land in the same order as the mutations that caused them.

use crate::camps;
use crate::error::RegistryError;
use crate::models::{EmergencyReport, RegistryState, ReliefCamp, ReportFields, ReportSubmission};
use crate::store::JsonStore;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde_json::Value;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Reports older than this are dropped by the sweeper.
pub const DEFAULT_TTL: Duration = Duration::minutes(5);

const MISSING_DEVICE_ID: &str = "deviceId required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Stored,
    /// A `CLEAR` status withdrew the report (or there was none to withdraw).
    Cleared,
}

pub struct Registry {
    state: RwLock<RegistryState>,
    store: JsonStore,
}

pub type SharedRegistry = Arc<Registry>;

impl Registry {
    /// Restores the registry from `store`, starting empty if nothing usable is on disk.
    pub fn open(store: JsonStore) -> Self {
        let state = store.load();
        Self::with_state(store, state)
    }

    pub fn with_state(store: JsonStore, state: RegistryState) -> Self {
        Self { state: RwLock::new(state), store }
    }

    fn persist(&self, guard: RwLockWriteGuard<'_, RegistryState>) -> Result<(), RegistryError> {
        let state = RwLockWriteGuard::downgrade(guard);
        self.store.save(&state).map_err(|e| {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to save state");
            RegistryError::from(e)
        })
    }

    pub fn upsert(&self, submission: ReportSubmission) -> Result<UpsertOutcome, RegistryError> {
        self.upsert_at(submission, OffsetDateTime::now_utc())
    }

    pub(crate) fn upsert_at(
        &self,
        submission: ReportSubmission,
        now: OffsetDateTime,
    ) -> Result<UpsertOutcome, RegistryError> {
        let device_id = required_device_id(submission.device_id)?;

        let mut state = self.state.write();
        let outcome = if submission.fields.is_clear() {
            if state.emergencies.remove(&device_id).is_some() {
                tracing::info!(device_id = %device_id, "report cleared");
            }
            UpsertOutcome::Cleared
        } else {
            let report = stamp(device_id, submission.fields, now);
            tracing::debug!(device_id = %report.device_id, "report stored");
            state.emergencies.insert(report.device_id.clone(), report);
            UpsertOutcome::Stored
        };
        self.persist(state)?;
        Ok(outcome)
    }

    /// Stores every entry that carries a device id, ignoring `CLEAR` statuses.
    ///
    /// Returns how many entries were applied. Saves once for the whole batch.
    pub fn bulk_upsert(&self, submissions: Vec<ReportSubmission>) -> Result<usize, RegistryError> {
        let mut state = self.state.write();
        let mut applied = 0;
        for submission in submissions {
            let Ok(device_id) = required_device_id(submission.device_id) else {
                tracing::debug!("skipping bulk entry without deviceId");
                continue;
            };
            let report = stamp(device_id, submission.fields, OffsetDateTime::now_utc());
            state.emergencies.insert(report.device_id.clone(), report);
            applied += 1;
        }
        tracing::info!(applied, "bulk update applied");
        self.persist(state)?;
        Ok(applied)
    }

    /// Removes a report. Returns whether one existed; only then is the state saved.
    pub fn remove(&self, device_id: &str) -> Result<bool, RegistryError> {
        let mut state = self.state.write();
        if state.emergencies.remove(device_id).is_none() {
            return Ok(false);
        }
        tracing::info!(device_id = %device_id, "report removed");
        self.persist(state)?;
        Ok(true)
    }

    pub fn list(&self) -> Vec<EmergencyReport> {
        self.state.read().emergencies.values().cloned().collect()
    }

    pub fn get(&self, device_id: &str) -> Option<EmergencyReport> {
        self.state.read().emergencies.get(device_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().emergencies.len()
    }

    /// Evicts every report older than `ttl`, returning the evicted device ids.
    pub fn sweep_expired(&self, ttl: Duration) -> Result<Vec<String>, RegistryError> {
        self.sweep_expired_at(OffsetDateTime::now_utc(), ttl)
    }

    pub(crate) fn sweep_expired_at(
        &self,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<Vec<String>, RegistryError> {
        let mut state = self.state.write();
        let expired: Vec<String> = state
            .emergencies
            .values()
            .filter(|report| now - report.timestamp > ttl)
            .map(|report| report.device_id.clone())
            .collect();

        if expired.is_empty() {
            return Ok(expired);
        }
        for device_id in &expired {
            state.emergencies.remove(device_id);
        }
        tracing::info!(count = expired.len(), "expired reports evicted");
        self.persist(state)?;
        Ok(expired)
    }

    pub fn list_camps(&self) -> Vec<ReliefCamp> {
        self.state.read().relief_camps.clone()
    }

    pub fn add_camp(&self, camp: ReliefCamp) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        tracing::info!(name = %camp.name, lat = camp.lat, lng = camp.lng, "relief camp added");
        state.relief_camps.push(camp);
        self.persist(state)
    }

    /// Validates loosely typed coordinates, then appends the camp.
    pub fn add_camp_from(
        &self,
        lat: Option<&Value>,
        lng: Option<&Value>,
        name: Option<String>,
    ) -> Result<ReliefCamp, RegistryError> {
        let camp = camps::camp_from_request(lat, lng, name)?;
        self.add_camp(camp.clone())?;
        Ok(camp)
    }

    pub fn remove_camp(&self, index: i64) -> Result<ReliefCamp, RegistryError> {
        let mut state = self.state.write();
        let removed = camps::remove_at(&mut state.relief_camps, index)?;
        tracing::info!(index, name = %removed.name, "relief camp removed");
        self.persist(state)?;
        Ok(removed)
    }

    /// Full copy of the current state.
    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }
}

fn required_device_id(device_id: Option<String>) -> Result<String, RegistryError> {
    device_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RegistryError::validation(MISSING_DEVICE_ID))
}

fn stamp(
    device_id: String,
    mut fields: ReportFields,
    now: OffsetDateTime,
) -> EmergencyReport {
    // client clocks are not trusted
    fields.extra.remove("timestamp");
    EmergencyReport { device_id, fields, timestamp: now }
}
