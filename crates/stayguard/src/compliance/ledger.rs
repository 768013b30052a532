//! Append-only audit ledger.
//!
//! Entries are never updated or deleted. Besides serving as the evidentiary trail, the
//! ledger answers "has this event already been recorded for this stay/property?", which
//! is how the sweep keeps every transition exactly-once across repeated runs and restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{GuestId, InvitationId, OwnerId, PropertyId, Stay, StayId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    StatusChange,
    ShieldMode,
    DeadMansSwitch,
    GuestSignature,
    FailedAttempt,
}

/// Closed set of ledger titles the core writes and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    ApproachingLimit,
    Overstay,
    PreEndNotice,
    LastDayShield,
    UrgentToday,
    AutoExecuted,
    StayRegistered,
    GuestCheckedOut,
    StayCancelled,
    ShieldDeactivated,
}

impl LedgerEvent {
    pub const fn title(self) -> &'static str {
        match self {
            LedgerEvent::ApproachingLimit => "Approaching stay limit",
            LedgerEvent::Overstay => "Overstay occurred",
            LedgerEvent::PreEndNotice => "48h before lease end",
            LedgerEvent::LastDayShield => "Shield Mode activated (last day of stay)",
            LedgerEvent::UrgentToday => "urgent – lease ends today",
            LedgerEvent::AutoExecuted => "auto-executed",
            LedgerEvent::StayRegistered => "Stay registered",
            LedgerEvent::GuestCheckedOut => "Guest checked out",
            LedgerEvent::StayCancelled => "Stay cancelled",
            LedgerEvent::ShieldDeactivated => "Shield Mode deactivated by owner",
        }
    }

    pub const fn category(self) -> AuditCategory {
        match self {
            LedgerEvent::ApproachingLimit
            | LedgerEvent::Overstay
            | LedgerEvent::StayRegistered
            | LedgerEvent::GuestCheckedOut
            | LedgerEvent::StayCancelled => AuditCategory::StatusChange,
            LedgerEvent::LastDayShield | LedgerEvent::ShieldDeactivated => {
                AuditCategory::ShieldMode
            }
            LedgerEvent::PreEndNotice | LedgerEvent::UrgentToday | LedgerEvent::AutoExecuted => {
                AuditCategory::DeadMansSwitch
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

/// Who caused an entry; the sweep writes as `System`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    System,
    Owner(OwnerId),
    Guest(GuestId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: EntryId,
    pub category: AuditCategory,
    pub event: LedgerEvent,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<PropertyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stay_id: Option<StayId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitation_id: Option<InvitationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl AuditLogEntry {
    pub fn from_new(id: EntryId, entry: NewAuditEntry) -> Self {
        Self {
            id,
            category: entry.event.category(),
            event: entry.event,
            title: entry.event.title().to_string(),
            message: entry.message,
            property_id: entry.property_id,
            stay_id: entry.stay_id,
            invitation_id: entry.invitation_id,
            actor: entry.actor,
            created_at: entry.created_at,
            meta: entry.meta,
        }
    }

    pub fn matches_stay(&self, event: LedgerEvent, stay_id: &StayId, since: Option<DateTime<Utc>>) -> bool {
        self.event == event
            && self.stay_id.as_ref() == Some(stay_id)
            && since.map_or(true, |since| self.created_at >= since)
    }

    pub fn matches_property(
        &self,
        event: LedgerEvent,
        property_id: &PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> bool {
        self.event == event
            && self.property_id.as_ref() == Some(property_id)
            && since.map_or(true, |since| self.created_at >= since)
    }
}

/// Entry as submitted by a caller; the ledger assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub event: LedgerEvent,
    pub message: String,
    pub property_id: Option<PropertyId>,
    pub stay_id: Option<StayId>,
    pub invitation_id: Option<InvitationId>,
    pub actor: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub meta: Option<serde_json::Value>,
}

impl NewAuditEntry {
    /// References the stay, its property and its invitation.
    pub fn for_stay(
        event: LedgerEvent,
        stay: &Stay,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            message: message.into(),
            property_id: Some(stay.property_id.clone()),
            stay_id: Some(stay.stay_id.clone()),
            invitation_id: stay.invitation_id.clone(),
            actor: Some(Actor::System),
            created_at,
            meta: None,
        }
    }

    pub fn for_property(
        event: LedgerEvent,
        property_id: &PropertyId,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            message: message.into(),
            property_id: Some(property_id.clone()),
            stay_id: None,
            invitation_id: None,
            actor: Some(Actor::System),
            created_at,
            meta: None,
        }
    }

    pub fn with_stay(mut self, stay_id: &StayId) -> Self {
        self.stay_id = Some(stay_id.clone());
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Storage abstraction for the audit trail.
///
/// `append` either commits the entry or fails; there are no partial writes. A committed
/// entry must be visible to the very next `exists_*` call.
pub trait AuditLedger: Send + Sync {
    fn append(&self, entry: NewAuditEntry) -> Result<EntryId, LedgerError>;

    fn exists_for_stay(
        &self,
        event: LedgerEvent,
        stay_id: &StayId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError>;

    fn exists_for_property(
        &self,
        event: LedgerEvent,
        property_id: &PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError>;

    fn entries_for_stay(&self, stay_id: &StayId) -> Result<Vec<AuditLogEntry>, LedgerError>;

    fn entries_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<AuditLogEntry>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("audit ledger unavailable: {0}")]
    Unavailable(String),
}
