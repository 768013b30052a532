use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::compliance::domain::{
    DeadMansSwitch, GuestId, OwnerId, Property, PropertyId, Stay, StayId, TokenState,
};
use crate::compliance::engine::{ComplianceEngine, SweepPolicy};
use crate::compliance::jurisdiction::JurisdictionResolver;
use crate::compliance::ledger::{
    AuditLedger, AuditLogEntry, EntryId, LedgerError, LedgerEvent, NewAuditEntry,
};
use crate::compliance::memory::{InMemoryAuditLedger, InMemoryStayRepository};
use crate::compliance::notifier::{Notification, NotificationKind, Notifier, NotifyError};
use crate::compliance::repository::StayRepository;
use crate::compliance::router::{compliance_router, ComplianceServices};
use crate::compliance::stays::{StayRegistration, StayService};

pub(super) const OWNER_EMAIL: &str = "owner@example.com";
pub(super) const GUEST_EMAIL: &str = "guest@example.com";
pub(super) const ADMIN_TOKEN: &str = "sweep-secret";

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date")
}

/// Mid-morning on `today()`.
pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn days_from_today(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

pub(super) fn property(id: &str) -> Property {
    Property {
        property_id: PropertyId(id.to_string()),
        owner_id: OwnerId("owner-1".to_string()),
        name: format!("Property {id}"),
        usat_token_state: TokenState::Released,
        shield_mode_enabled: false,
    }
}

/// Ten-day Florida stay on `prop-1` with the switch and its alerts on.
pub(super) fn stay(id: &str, end_date: NaiveDate) -> Stay {
    Stay {
        stay_id: StayId(id.to_string()),
        guest_id: GuestId("guest-1".to_string()),
        owner_id: OwnerId("owner-1".to_string()),
        property_id: PropertyId("prop-1".to_string()),
        guest_email: GUEST_EMAIL.to_string(),
        owner_email: OWNER_EMAIL.to_string(),
        region_code: "FL".to_string(),
        start_date: end_date - Duration::days(10),
        end_date,
        owner_occupied: false,
        invitation_id: None,
        checked_out_at: None,
        cancelled_at: None,
        dead_mans_switch: DeadMansSwitch {
            enabled: true,
            alert_email: true,
        },
        dead_mans_switch_triggered_at: None,
    }
}

pub(super) fn stay_without_switch(id: &str, end_date: NaiveDate) -> Stay {
    let mut stay = stay(id, end_date);
    stay.dead_mans_switch = DeadMansSwitch::default();
    stay
}

pub(super) fn registration() -> StayRegistration {
    StayRegistration {
        guest_id: GuestId("guest-1".to_string()),
        owner_id: OwnerId("owner-1".to_string()),
        property_id: PropertyId("prop-1".to_string()),
        guest_email: GUEST_EMAIL.to_string(),
        owner_email: OWNER_EMAIL.to_string(),
        region_code: "fl".to_string(),
        start_date: days_from_today(1),
        end_date: days_from_today(15),
        owner_occupied: false,
        invitation_id: None,
        dead_mans_switch: DeadMansSwitch {
            enabled: true,
            alert_email: true,
        },
    }
}

/// Records every delivery; can be switched to reject everything.
#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub(super) fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn sent_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.kind == kind)
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("smtp relay offline".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

/// In-memory ledger whose appends can be made to fail.
#[derive(Default)]
pub(super) struct FlakyLedger {
    inner: InMemoryAuditLedger,
    failing_appends: AtomicBool,
}

impl FlakyLedger {
    pub(super) fn fail_appends(&self, failing: bool) {
        self.failing_appends.store(failing, Ordering::SeqCst);
    }

    pub(super) fn entries(&self) -> Vec<AuditLogEntry> {
        self.inner.entries().expect("ledger readable")
    }

    pub(super) fn count(&self, event: LedgerEvent) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.event == event)
            .count()
    }

    pub(super) fn count_for_stay(&self, event: LedgerEvent, stay_id: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| {
                entry.event == event
                    && entry.stay_id.as_ref().map(|id| id.0.as_str()) == Some(stay_id)
            })
            .count()
    }
}

impl AuditLedger for FlakyLedger {
    fn append(&self, entry: NewAuditEntry) -> Result<EntryId, LedgerError> {
        if self.failing_appends.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("disk full".to_string()));
        }
        self.inner.append(entry)
    }

    fn exists_for_stay(
        &self,
        event: LedgerEvent,
        stay_id: &StayId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        self.inner.exists_for_stay(event, stay_id, since)
    }

    fn exists_for_property(
        &self,
        event: LedgerEvent,
        property_id: &PropertyId,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        self.inner.exists_for_property(event, property_id, since)
    }

    fn entries_for_stay(&self, stay_id: &StayId) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.inner.entries_for_stay(stay_id)
    }

    fn entries_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.inner.entries_for_property(property_id)
    }
}

pub(super) type TestEngine = ComplianceEngine<InMemoryStayRepository, FlakyLedger, MemoryNotifier>;

pub(super) struct Harness {
    pub(super) repository: Arc<InMemoryStayRepository>,
    pub(super) ledger: Arc<FlakyLedger>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) engine: Arc<TestEngine>,
    pub(super) stays: Arc<StayService<InMemoryStayRepository, FlakyLedger>>,
}

impl Harness {
    pub(super) fn stay(&self, id: &str) -> Stay {
        self.repository
            .get_stay(&StayId(id.to_string()))
            .expect("repository readable")
            .expect("stay present")
    }

    pub(super) fn property(&self, id: &str) -> Property {
        self.repository
            .get_property(&PropertyId(id.to_string()))
            .expect("repository readable")
            .expect("property present")
    }

    pub(super) fn router(&self, admin_token: Option<&str>) -> axum::Router {
        compliance_router(ComplianceServices {
            engine: self.engine.clone(),
            stays: self.stays.clone(),
            admin_token: admin_token.map(str::to_string),
        })
    }
}

pub(super) fn harness(stays: Vec<Stay>) -> Harness {
    harness_with(vec![property("prop-1")], stays, SweepPolicy::default())
}

pub(super) fn harness_with(
    properties: Vec<Property>,
    stays: Vec<Stay>,
    policy: SweepPolicy,
) -> Harness {
    let repository = Arc::new(InMemoryStayRepository::new(properties, stays));
    let ledger = Arc::new(FlakyLedger::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let resolver = Arc::new(JurisdictionResolver::default());
    let engine = Arc::new(ComplianceEngine::new(
        repository.clone(),
        ledger.clone(),
        notifier.clone(),
        resolver.clone(),
        policy,
    ));
    let stays = Arc::new(StayService::new(repository.clone(), ledger.clone(), resolver));
    Harness {
        repository,
        ledger,
        notifier,
        engine,
        stays,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
