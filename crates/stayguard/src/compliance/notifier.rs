use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Template selector handed to the delivery adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StayLimitApproaching,
    OverstayDetected,
    LeaseEndingSoon,
    LeaseEndsToday,
    ShieldModeActivated,
    AutoExecuted,
}

impl NotificationKind {
    pub const fn template(self) -> &'static str {
        match self {
            NotificationKind::StayLimitApproaching => "stay_limit_approaching",
            NotificationKind::OverstayDetected => "overstay_detected",
            NotificationKind::LeaseEndingSoon => "dead_mans_switch_48h",
            NotificationKind::LeaseEndsToday => "dead_mans_switch_urgent",
            NotificationKind::ShieldModeActivated => "shield_mode_activated",
            NotificationKind::AutoExecuted => "dead_mans_switch_auto_executed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub context: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            recipient: recipient.into(),
            kind,
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outbound delivery hook (e-mail, SMS, ...). Delivery is best-effort: the engine logs and
/// counts failures but never lets them block a state transition.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient '{0}' rejected")]
    Rejected(String),
}
