//! In-process store and ledger backing the CLI, the demo, and the HTTP service.
//!
//! State can be loaded from and written back to a JSON snapshot so that ledger entries and
//! trigger timestamps survive between process runs. [`SnapshotStore`] writes every committed
//! mutation through to that file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Property, PropertyId, Stay, StayId};
use super::ledger::{AuditLedger, AuditLogEntry, EntryId, LedgerError, LedgerEvent, NewAuditEntry};
use super::repository::{RepositoryError, StayRepository};

const STAY_ID_PREFIX: &str = "stay-";

fn stay_sequence_number(id: &StayId) -> Option<u64> {
    id.0.strip_prefix(STAY_ID_PREFIX)?.parse().ok()
}

#[derive(Debug, Default)]
pub struct InMemoryStayRepository {
    stays: Mutex<BTreeMap<StayId, Stay>>,
    properties: Mutex<BTreeMap<PropertyId, Property>>,
    /// Highest sequence number issued or seen in a stored id.
    stay_sequence: AtomicU64,
}

impl InMemoryStayRepository {
    pub fn new(properties: Vec<Property>, stays: Vec<Stay>) -> Self {
        let highest = stays
            .iter()
            .filter_map(|stay| stay_sequence_number(&stay.stay_id))
            .max()
            .unwrap_or(0);
        Self {
            stay_sequence: AtomicU64::new(highest),
            stays: Mutex::new(
                stays
                    .into_iter()
                    .map(|stay| (stay.stay_id.clone(), stay))
                    .collect(),
            ),
            properties: Mutex::new(
                properties
                    .into_iter()
                    .map(|property| (property.property_id.clone(), property))
                    .collect(),
            ),
        }
    }

    pub fn stays(&self) -> Result<Vec<Stay>, RepositoryError> {
        Ok(self.stays_guard()?.values().cloned().collect())
    }

    pub fn properties(&self) -> Result<Vec<Property>, RepositoryError> {
        Ok(self.properties_guard()?.values().cloned().collect())
    }

    fn stays_guard(&self) -> Result<MutexGuard<'_, BTreeMap<StayId, Stay>>, RepositoryError> {
        self.stays
            .lock()
            .map_err(|_| RepositoryError::Unavailable("stay store lock poisoned".to_string()))
    }

    fn properties_guard(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<PropertyId, Property>>, RepositoryError> {
        self.properties
            .lock()
            .map_err(|_| RepositoryError::Unavailable("property store lock poisoned".to_string()))
    }

    fn active_where<F>(&self, predicate: F) -> Result<Vec<Stay>, RepositoryError>
    where
        F: Fn(&Stay) -> bool,
    {
        Ok(self
            .stays_guard()?
            .values()
            .filter(|stay| stay.is_active() && predicate(stay))
            .cloned()
            .collect())
    }
}

impl StayRepository for InMemoryStayRepository {
    fn list_active_stays(&self) -> Result<Vec<Stay>, RepositoryError> {
        self.active_where(|_| true)
    }

    fn list_stays_ending_on(&self, date: NaiveDate) -> Result<Vec<Stay>, RepositoryError> {
        self.active_where(|stay| stay.end_date == date)
    }

    fn list_stays_ending_before(&self, date: NaiveDate) -> Result<Vec<Stay>, RepositoryError> {
        self.active_where(|stay| stay.end_date < date)
    }

    fn next_stay_id(&self) -> Result<StayId, RepositoryError> {
        let guard = self.stays_guard()?;
        loop {
            let next = self.stay_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let id = StayId(format!("{STAY_ID_PREFIX}{next:06}"));
            if !guard.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn get_stay(&self, id: &StayId) -> Result<Option<Stay>, RepositoryError> {
        Ok(self.stays_guard()?.get(id).cloned())
    }

    fn insert_stay(&self, stay: Stay) -> Result<Stay, RepositoryError> {
        let mut guard = self.stays_guard()?;
        if guard.contains_key(&stay.stay_id) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(number) = stay_sequence_number(&stay.stay_id) {
            self.stay_sequence.fetch_max(number, Ordering::SeqCst);
        }
        guard.insert(stay.stay_id.clone(), stay.clone());
        Ok(stay)
    }

    fn save_stay(&self, stay: &Stay) -> Result<(), RepositoryError> {
        let mut guard = self.stays_guard()?;
        match guard.get_mut(&stay.stay_id) {
            Some(existing) => {
                *existing = stay.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn get_property(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        Ok(self.properties_guard()?.get(id).cloned())
    }

    fn insert_property(&self, property: Property) -> Result<Property, RepositoryError> {
        let mut guard = self.properties_guard()?;
        if guard.contains_key(&property.property_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(property.property_id.clone(), property.clone());
        Ok(property)
    }

    fn save_property(&self, property: &Property) -> Result<(), RepositoryError> {
        let mut guard = self.properties_guard()?;
        match guard.get_mut(&property.property_id) {
            Some(existing) => {
                *existing = property.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

/// Vec-backed ledger; ids are assigned sequentially under the same lock as the push.
#[derive(Debug, Default)]
pub struct InMemoryAuditLedger {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditLedger {
    pub fn from_entries(entries: Vec<AuditLogEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self.guard()?.clone())
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.guard()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.guard()?.is_empty())
    }

    fn guard(&self) -> Result<MutexGuard<'_, Vec<AuditLogEntry>>, LedgerError> {
        self.entries
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))
    }
}

impl AuditLedger for InMemoryAuditLedger {
    fn append(&self, entry: NewAuditEntry) -> Result<EntryId, LedgerError> {
        let mut guard = self.guard()?;
        let next = guard.iter().map(|entry| entry.id.0).max().unwrap_or(0) + 1;
        let id = EntryId(next);
        guard.push(AuditLogEntry::from_new(id, entry));
        Ok(id)
    }

    fn exists_for_stay(
        &self,
        event: LedgerEvent,
        stay_id: &StayId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .guard()?
            .iter()
            .any(|entry| entry.matches_stay(event, stay_id, since)))
    }

    fn exists_for_property(
        &self,
        event: LedgerEvent,
        property_id: &PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .guard()?
            .iter()
            .any(|entry| entry.matches_property(event, property_id, since)))
    }

    fn entries_for_stay(&self, stay_id: &StayId) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self
            .guard()?
            .iter()
            .filter(|entry| entry.stay_id.as_ref() == Some(stay_id))
            .cloned()
            .collect())
    }

    fn entries_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self
            .guard()?
            .iter()
            .filter(|entry| entry.property_id.as_ref() == Some(property_id))
            .cloned()
            .collect())
    }
}

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub stays: Vec<Stay>,
    #[serde(default)]
    pub ledger: Vec<AuditLogEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StoreSnapshot {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn capture(
        repository: &InMemoryStayRepository,
        ledger: &InMemoryAuditLedger,
    ) -> Result<Self, SnapshotError> {
        Ok(Self {
            properties: repository.properties()?,
            stays: repository.stays()?,
            ledger: ledger.entries()?,
        })
    }

    /// Writes to a sibling temp file and renames it over `path`, so readers never see a
    /// half-written snapshot.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    pub fn into_stores(self) -> (InMemoryStayRepository, InMemoryAuditLedger) {
        (
            InMemoryStayRepository::new(self.properties, self.stays),
            InMemoryAuditLedger::from_entries(self.ledger),
        )
    }
}

/// Repository and ledger backed by one JSON snapshot file.
///
/// Each insert, save, and ledger append is followed by a full snapshot write, so a crash
/// loses at most the mutation in flight. A failed write surfaces as `Unavailable`; the change
/// stays in memory and the next successful write carries it. Without a path the store is
/// purely in-memory.
#[derive(Debug)]
pub struct SnapshotStore {
    repository: InMemoryStayRepository,
    ledger: InMemoryAuditLedger,
    path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(snapshot: StoreSnapshot, path: Option<PathBuf>) -> Self {
        let (repository, ledger) = snapshot.into_stores();
        Self {
            repository,
            ledger,
            path,
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, SnapshotError> {
        StoreSnapshot::capture(&self.repository, &self.ledger)
    }

    pub fn flush(&self) -> Result<(), SnapshotError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        // Capture under the writer lock so a later write never lands an older state.
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.snapshot()?.write_to(path)
    }

    fn flush_repository(&self) -> Result<(), RepositoryError> {
        self.flush()
            .map_err(|err| RepositoryError::Unavailable(format!("snapshot write failed: {err}")))
    }

    fn flush_ledger(&self) -> Result<(), LedgerError> {
        self.flush()
            .map_err(|err| LedgerError::Unavailable(format!("snapshot write failed: {err}")))
    }
}

impl StayRepository for SnapshotStore {
    fn list_active_stays(&self) -> Result<Vec<Stay>, RepositoryError> {
        self.repository.list_active_stays()
    }

    fn list_stays_ending_on(&self, date: NaiveDate) -> Result<Vec<Stay>, RepositoryError> {
        self.repository.list_stays_ending_on(date)
    }

    fn list_stays_ending_before(&self, date: NaiveDate) -> Result<Vec<Stay>, RepositoryError> {
        self.repository.list_stays_ending_before(date)
    }

    fn next_stay_id(&self) -> Result<StayId, RepositoryError> {
        self.repository.next_stay_id()
    }

    fn get_stay(&self, id: &StayId) -> Result<Option<Stay>, RepositoryError> {
        self.repository.get_stay(id)
    }

    fn insert_stay(&self, stay: Stay) -> Result<Stay, RepositoryError> {
        let stay = self.repository.insert_stay(stay)?;
        self.flush_repository()?;
        Ok(stay)
    }

    fn save_stay(&self, stay: &Stay) -> Result<(), RepositoryError> {
        self.repository.save_stay(stay)?;
        self.flush_repository()
    }

    fn get_property(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        self.repository.get_property(id)
    }

    fn insert_property(&self, property: Property) -> Result<Property, RepositoryError> {
        let property = self.repository.insert_property(property)?;
        self.flush_repository()?;
        Ok(property)
    }

    fn save_property(&self, property: &Property) -> Result<(), RepositoryError> {
        self.repository.save_property(property)?;
        self.flush_repository()
    }
}

impl AuditLedger for SnapshotStore {
    fn append(&self, entry: NewAuditEntry) -> Result<EntryId, LedgerError> {
        let id = self.ledger.append(entry)?;
        self.flush_ledger()?;
        Ok(id)
    }

    fn exists_for_stay(
        &self,
        event: LedgerEvent,
        stay_id: &StayId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        self.ledger.exists_for_stay(event, stay_id, since)
    }

    fn exists_for_property(
        &self,
        event: LedgerEvent,
        property_id: &PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        self.ledger.exists_for_property(event, property_id, since)
    }

    fn entries_for_stay(&self, stay_id: &StayId) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.ledger.entries_for_stay(stay_id)
    }

    fn entries_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.ledger.entries_for_property(property_id)
    }
}
