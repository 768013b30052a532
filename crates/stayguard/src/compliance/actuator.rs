use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Property, PropertyId, Stay, TokenState};
use super::repository::{RepositoryError, StayRepository};

/// What a lockdown actually changed on the property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockdownOutcome {
    pub token_revoked: bool,
    pub shield_activated: bool,
}

/// Applies enforcement side effects. Every operation is a no-op on data that is already
/// in the target state and only writes when something changed.
pub struct EnforcementActuator<R> {
    repository: Arc<R>,
}

impl<R> EnforcementActuator<R>
where
    R: StayRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn activate_shield_mode(&self, property_id: &PropertyId) -> Result<bool, RepositoryError> {
        let mut property = self.load_property(property_id)?;
        let changed = enable_shield(&mut property);
        if changed {
            self.repository.save_property(&property)?;
        }
        Ok(changed)
    }

    pub fn revoke_shared_token(&self, property_id: &PropertyId) -> Result<bool, RepositoryError> {
        let mut property = self.load_property(property_id)?;
        let changed = stage_token(&mut property);
        if changed {
            self.repository.save_property(&property)?;
        }
        Ok(changed)
    }

    /// Token revocation and Shield Mode in a single property write.
    pub fn lock_down(&self, property_id: &PropertyId) -> Result<LockdownOutcome, RepositoryError> {
        let mut property = self.load_property(property_id)?;
        let outcome = LockdownOutcome {
            token_revoked: stage_token(&mut property),
            shield_activated: enable_shield(&mut property),
        };
        if outcome.token_revoked || outcome.shield_activated {
            self.repository.save_property(&property)?;
        }
        Ok(outcome)
    }

    /// Ends the occupancy and stamps the switch trigger. Existing timestamps are kept.
    pub fn mark_vacated(&self, stay: &mut Stay, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut changed = false;
        if stay.checked_out_at.is_none() && stay.cancelled_at.is_none() {
            stay.checked_out_at = Some(now);
            changed = true;
        }
        if stay.dead_mans_switch_triggered_at.is_none() {
            stay.dead_mans_switch_triggered_at = Some(now);
            changed = true;
        }
        if changed {
            self.repository.save_stay(stay)?;
        }
        Ok(changed)
    }

    fn load_property(&self, property_id: &PropertyId) -> Result<Property, RepositoryError> {
        self.repository
            .get_property(property_id)?
            .ok_or(RepositoryError::NotFound)
    }
}

fn enable_shield(property: &mut Property) -> bool {
    if property.shield_mode_enabled {
        return false;
    }
    property.shield_mode_enabled = true;
    true
}

fn stage_token(property: &mut Property) -> bool {
    if property.usat_token_state == TokenState::Staged {
        return false;
    }
    property.usat_token_state = TokenState::Staged;
    true
}
