use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::domain::{
    stay_duration_days, DeadMansSwitch, GuestId, InvitationId, OwnerId, Property, PropertyId, Stay,
    StayId,
};
use super::jurisdiction::{ClassificationResult, JurisdictionResolver, ResolveError};
use super::ledger::{
    Actor, AuditLedger, AuditLogEntry, LedgerError, LedgerEvent, NewAuditEntry,
};
use super::repository::{RepositoryError, StayRepository};

/// Inbound request to create an occupancy record once a guest accepts an invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRegistration {
    pub guest_id: GuestId,
    pub owner_id: OwnerId,
    pub property_id: PropertyId,
    pub guest_email: String,
    pub owner_email: String,
    pub region_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub owner_occupied: bool,
    #[serde(default)]
    pub invitation_id: Option<InvitationId>,
    #[serde(default)]
    pub dead_mans_switch: DeadMansSwitch,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredStay {
    pub stay: Stay,
    pub classification: ClassificationResult,
}

/// Stay lifecycle actions that sit outside the sweep: creation, guest checkout or
/// cancellation, and the owner clearing Shield Mode.
pub struct StayService<R, L> {
    repository: Arc<R>,
    ledger: Arc<L>,
    resolver: Arc<JurisdictionResolver>,
}

impl<R, L> StayService<R, L>
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
{
    pub fn new(repository: Arc<R>, ledger: Arc<L>, resolver: Arc<JurisdictionResolver>) -> Self {
        Self {
            repository,
            ledger,
            resolver,
        }
    }

    pub fn resolver(&self) -> &JurisdictionResolver {
        &self.resolver
    }

    /// Persist a new stay, rejecting unknown regions and stays already over the limit.
    pub fn register(
        &self,
        registration: StayRegistration,
        now: DateTime<Utc>,
    ) -> Result<RegisteredStay, StayServiceError> {
        if registration.end_date < registration.start_date {
            return Err(StayServiceError::InvalidDates {
                start: registration.start_date,
                end: registration.end_date,
            });
        }

        let property = self
            .repository
            .get_property(&registration.property_id)?
            .ok_or(RepositoryError::NotFound)?;
        if property.owner_id != registration.owner_id {
            return Err(StayServiceError::NotPropertyOwner);
        }

        let duration = stay_duration_days(registration.start_date, registration.end_date);
        let classification = self.resolver.resolve(
            &registration.region_code,
            duration,
            registration.owner_occupied,
        )?;
        if !classification.is_within_limit() {
            return Err(StayServiceError::ExceedsLimit {
                message: classification.message.clone().unwrap_or_else(|| {
                    format!("stay of {duration} days exceeds the jurisdiction limit")
                }),
                classification: Box::new(classification),
            });
        }

        let stay = Stay {
            stay_id: self.repository.next_stay_id()?,
            guest_id: registration.guest_id,
            owner_id: registration.owner_id,
            property_id: registration.property_id,
            guest_email: registration.guest_email,
            owner_email: registration.owner_email,
            region_code: classification.region_code.clone(),
            start_date: registration.start_date,
            end_date: registration.end_date,
            owner_occupied: registration.owner_occupied,
            invitation_id: registration.invitation_id,
            checked_out_at: None,
            cancelled_at: None,
            dead_mans_switch: registration.dead_mans_switch,
            dead_mans_switch_triggered_at: None,
        };
        let stay = self.repository.insert_stay(stay)?;

        self.ledger.append(
            NewAuditEntry::for_stay(
                LedgerEvent::StayRegistered,
                &stay,
                format!(
                    "Stay registered as {} for {} day(s) (limit {})",
                    classification.classification.label(),
                    duration,
                    classification.max_allowed_days
                ),
                now,
            )
            .with_actor(Actor::Guest(stay.guest_id.clone()))
            .with_meta(json!({
                "classification": classification.classification,
                "risk_level": classification.risk_level,
                "max_allowed_days": classification.max_allowed_days,
                "statutes": classification.statutes,
            })),
        )?;

        info!(stay_id = %stay.stay_id, property_id = %stay.property_id, "stay registered");
        Ok(RegisteredStay {
            stay,
            classification,
        })
    }

    pub fn checkout(&self, stay_id: &StayId, now: DateTime<Utc>) -> Result<Stay, StayServiceError> {
        let mut stay = self.active_stay(stay_id)?;
        stay.checked_out_at = Some(now);
        self.repository.save_stay(&stay)?;
        self.ledger.append(
            NewAuditEntry::for_stay(
                LedgerEvent::GuestCheckedOut,
                &stay,
                format!("Guest checked out of stay {}", stay.stay_id),
                now,
            )
            .with_actor(Actor::Guest(stay.guest_id.clone())),
        )?;
        Ok(stay)
    }

    pub fn cancel(&self, stay_id: &StayId, now: DateTime<Utc>) -> Result<Stay, StayServiceError> {
        let mut stay = self.active_stay(stay_id)?;
        stay.cancelled_at = Some(now);
        self.repository.save_stay(&stay)?;
        self.ledger.append(
            NewAuditEntry::for_stay(
                LedgerEvent::StayCancelled,
                &stay,
                format!("Stay {} cancelled", stay.stay_id),
                now,
            )
            .with_actor(Actor::Guest(stay.guest_id.clone())),
        )?;
        Ok(stay)
    }

    /// Only the owning owner may clear Shield Mode; clearing an inactive shield is a no-op.
    pub fn deactivate_shield_mode(
        &self,
        property_id: &PropertyId,
        owner_id: &OwnerId,
        now: DateTime<Utc>,
    ) -> Result<Property, StayServiceError> {
        let mut property = self
            .repository
            .get_property(property_id)?
            .ok_or(RepositoryError::NotFound)?;
        if &property.owner_id != owner_id {
            return Err(StayServiceError::NotPropertyOwner);
        }
        if !property.shield_mode_enabled {
            return Ok(property);
        }

        property.shield_mode_enabled = false;
        self.repository.save_property(&property)?;
        self.ledger.append(
            NewAuditEntry::for_property(
                LedgerEvent::ShieldDeactivated,
                &property.property_id,
                format!("Owner cleared Shield Mode for {}", property.display_name()),
                now,
            )
            .with_actor(Actor::Owner(owner_id.clone())),
        )?;
        Ok(property)
    }

    pub fn audit_trail(&self, stay_id: &StayId) -> Result<Vec<AuditLogEntry>, StayServiceError> {
        if self.repository.get_stay(stay_id)?.is_none() {
            return Err(RepositoryError::NotFound.into());
        }
        Ok(self.ledger.entries_for_stay(stay_id)?)
    }

    fn active_stay(&self, stay_id: &StayId) -> Result<Stay, StayServiceError> {
        let stay = self
            .repository
            .get_stay(stay_id)?
            .ok_or(RepositoryError::NotFound)?;
        if !stay.is_active() {
            return Err(StayServiceError::AlreadyInactive(stay.stay_id));
        }
        Ok(stay)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StayServiceError {
    #[error("stay end date {end} precedes start date {start}")]
    InvalidDates { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    UnknownRegion(#[from] ResolveError),
    #[error("{message}")]
    ExceedsLimit {
        message: String,
        classification: Box<ClassificationResult>,
    },
    #[error("stay {0} is already checked out or cancelled")]
    AlreadyInactive(StayId),
    #[error("caller does not own this property")]
    NotPropertyOwner,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
