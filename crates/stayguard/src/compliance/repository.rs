use chrono::NaiveDate;

use super::domain::{Property, PropertyId, Stay, StayId};

/// Storage abstraction for stays and the property fields the engine mutates.
///
/// The `list_*` queries return active stays only (no checkout, no cancellation).
pub trait StayRepository: Send + Sync {
    fn list_active_stays(&self) -> Result<Vec<Stay>, RepositoryError>;
    fn list_stays_ending_on(&self, date: NaiveDate) -> Result<Vec<Stay>, RepositoryError>;
    fn list_stays_ending_before(&self, date: NaiveDate) -> Result<Vec<Stay>, RepositoryError>;
    /// An id no stored stay holds, including stays loaded from earlier runs.
    fn next_stay_id(&self) -> Result<StayId, RepositoryError>;
    fn get_stay(&self, id: &StayId) -> Result<Option<Stay>, RepositoryError>;
    fn insert_stay(&self, stay: Stay) -> Result<Stay, RepositoryError>;
    fn save_stay(&self, stay: &Stay) -> Result<(), RepositoryError>;
    fn get_property(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError>;
    fn insert_property(&self, property: Property) -> Result<Property, RepositoryError>;
    fn save_property(&self, property: &Property) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
