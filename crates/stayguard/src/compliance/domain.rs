use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for occupancy records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StayId(pub String);

impl fmt::Display for StayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub String);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvitationId(pub String);

/// Per-stay enablement for the staged enforcement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadMansSwitch {
    #[serde(default)]
    pub enabled: bool,
    /// Owner notifications for the switch stages; on unless explicitly turned off.
    #[serde(default = "alerts_on")]
    pub alert_email: bool,
}

impl Default for DeadMansSwitch {
    fn default() -> Self {
        Self {
            enabled: false,
            alert_email: alerts_on(),
        }
    }
}

fn alerts_on() -> bool {
    true
}

/// A guest's authorized occupancy of a property between two calendar dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub stay_id: StayId,
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
    pub checked_out_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dead_mans_switch: DeadMansSwitch,
    #[serde(default)]
    pub dead_mans_switch_triggered_at: Option<DateTime<Utc>>,
}

impl Stay {
    /// Checked-out and cancelled stays are terminal.
    pub fn is_active(&self) -> bool {
        self.checked_out_at.is_none() && self.cancelled_at.is_none()
    }

    pub fn duration_days(&self) -> i64 {
        stay_duration_days(self.start_date, self.end_date)
    }

    pub fn switch_enabled(&self) -> bool {
        self.dead_mans_switch.enabled
    }

    pub fn switch_alerts_enabled(&self) -> bool {
        self.dead_mans_switch.enabled && self.dead_mans_switch.alert_email
    }

    pub fn has_triggered(&self) -> bool {
        self.dead_mans_switch_triggered_at.is_some()
    }
}

/// Whole days between two calendar dates; negative when `end` precedes `start`.
pub fn stay_duration_days(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days()
}

/// Release state of the shared access token (USAT).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    #[default]
    Staged,
    Released,
}

impl TokenState {
    pub const fn label(self) -> &'static str {
        match self {
            TokenState::Staged => "staged",
            TokenState::Released => "released",
        }
    }
}

/// The two property fields the enforcement engine is allowed to touch, plus display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub property_id: PropertyId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub usat_token_state: TokenState,
    #[serde(default)]
    pub shield_mode_enabled: bool,
}

impl Property {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.property_id.0
        } else {
            &self.name
        }
    }
}
