//! Compliance reconciliation sweep.
//!
//! One sweep walks the active stays in four passes (approaching-limit warnings, overstay
//! detection, then the Dead Man's Switch stages) and is safe to repeat: each transition
//! checks the ledger before acting and records itself afterwards. Units of work are
//! processed sequentially, so property-keyed stages never race each other.

mod switch;
mod warnings;

use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::actuator::EnforcementActuator;
use super::domain::{Stay, StayId};
use super::jurisdiction::{JurisdictionResolver, ResolveError};
use super::ledger::{AuditLedger, LedgerError};
use super::notifier::{Notification, NotificationKind, Notifier};
use super::repository::{RepositoryError, StayRepository};
use crate::config::SweepConfig;

/// Window offsets used by the sweep passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Stays ending within this many days receive an approaching-limit warning.
    pub warning_window_days: u32,
    /// Limit warnings to one per stay per day.
    pub dedupe_warnings: bool,
    /// Days before the end date for the first switch notice.
    pub notice_days: u32,
    /// Days after the end date before auto-execution.
    pub grace_days: u32,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SweepPolicy {
    fn from(config: &SweepConfig) -> Self {
        Self {
            warning_window_days: config.warning_window_days,
            dedupe_warnings: config.dedupe_warnings,
            notice_days: config.notice_days,
            grace_days: config.grace_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPass {
    ApproachingLimit,
    Overstay,
    PreEndNotice,
    LastDayShield,
    UrgentToday,
    AutoExecute,
}

/// A unit of work that was aborted; the next sweep retries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub stay_id: StayId,
    pub pass: SweepPass,
    pub error: String,
}

/// Outcome counters for one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub today: NaiveDate,
    pub active_stays: usize,
    pub limit_warnings: usize,
    pub overstays: usize,
    pub pre_end_notices: usize,
    pub last_day_shields: usize,
    pub urgent_notices: usize,
    pub auto_executions: usize,
    pub repaired_auto_executions: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub unknown_regions: Vec<StayId>,
    pub failures: Vec<UnitFailure>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            today: started_at.date_naive(),
            active_stays: 0,
            limit_warnings: 0,
            overstays: 0,
            pre_end_notices: 0,
            last_day_shields: 0,
            urgent_notices: 0,
            auto_executions: 0,
            repaired_auto_executions: 0,
            notifications_sent: 0,
            notification_failures: 0,
            unknown_regions: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Dead Man's Switch transitions fired by this sweep.
    pub fn switch_transitions(&self) -> usize {
        self.pre_end_notices + self.last_day_shields + self.urgent_notices + self.auto_executions
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("a compliance sweep is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failure inside a single stay's unit of work.
#[derive(Debug, thiserror::Error)]
pub(crate) enum UnitError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Orchestrates the resolver, ledger, repository, notifier and actuator for a sweep.
pub struct ComplianceEngine<R, L, N> {
    repository: Arc<R>,
    ledger: Arc<L>,
    notifier: Arc<N>,
    resolver: Arc<JurisdictionResolver>,
    actuator: EnforcementActuator<R>,
    policy: SweepPolicy,
    in_flight: Mutex<()>,
    last_completed: Mutex<Option<DateTime<Utc>>>,
}

impl<R, L, N> ComplianceEngine<R, L, N>
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        ledger: Arc<L>,
        notifier: Arc<N>,
        resolver: Arc<JurisdictionResolver>,
        policy: SweepPolicy,
    ) -> Self {
        let actuator = EnforcementActuator::new(repository.clone());
        Self {
            repository,
            ledger,
            notifier,
            resolver,
            actuator,
            policy,
            in_flight: Mutex::new(()),
            last_completed: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &SweepPolicy {
        &self.policy
    }

    pub fn resolver(&self) -> &JurisdictionResolver {
        &self.resolver
    }

    /// Start time of the most recent sweep that ran to completion.
    pub fn last_completed(&self) -> Option<DateTime<Utc>> {
        self.last_completed.lock().ok().and_then(|guard| *guard)
    }

    /// Run one sweep as of `now`. Concurrent invocations are rejected, not queued.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let _running = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(SweepError::AlreadyRunning),
            // A previous sweep panicked; every unit it touched is still guarded by the ledger.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let mut report = SweepReport::new(now);
        let active = self.repository.list_active_stays()?;
        report.active_stays = active.len();
        info!(today = %report.today, active = active.len(), "compliance sweep started");

        self.warn_approaching_limits(&active, now, &mut report);
        self.detect_overstays(now, &mut report)?;
        self.advance_dead_mans_switch(now, &mut report)?;

        if let Ok(mut last) = self.last_completed.lock() {
            *last = Some(now);
        }

        info!(
            today = %report.today,
            limit_warnings = report.limit_warnings,
            overstays = report.overstays,
            switch_transitions = report.switch_transitions(),
            notification_failures = report.notification_failures,
            failures = report.failures.len(),
            "compliance sweep finished"
        );
        Ok(report)
    }

    /// Best-effort delivery; failures are logged and counted, never propagated.
    fn notify(&self, notification: Notification, report: &mut SweepReport) -> bool {
        match self.notifier.notify(&notification) {
            Ok(()) => {
                report.notifications_sent += 1;
                true
            }
            Err(err) => {
                warn!(
                    recipient = %notification.recipient,
                    template = notification.kind.template(),
                    error = %err,
                    "notification delivery failed; continuing sweep"
                );
                report.notification_failures += 1;
                false
            }
        }
    }

    /// Statute text and limit for messages; unknown regions degrade to the raw region code.
    fn limit_context(&self, stay: &Stay, report: &mut SweepReport) -> LimitContext {
        match self
            .resolver
            .resolve(&stay.region_code, stay.duration_days(), stay.owner_occupied)
        {
            Ok(result) => LimitContext {
                statute: result
                    .primary_statute()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} occupancy rules", result.region_code)),
                max_allowed_days: Some(result.max_allowed_days),
            },
            Err(ResolveError::UnknownRegion(region)) => {
                warn!(
                    stay_id = %stay.stay_id,
                    region = %region,
                    "no jurisdiction rule for stay region; using region code in notices"
                );
                if !report.unknown_regions.contains(&stay.stay_id) {
                    report.unknown_regions.push(stay.stay_id.clone());
                }
                LimitContext {
                    statute: stay.region_code.clone(),
                    max_allowed_days: None,
                }
            }
        }
    }
}

struct LimitContext {
    statute: String,
    max_allowed_days: Option<u32>,
}

impl LimitContext {
    fn apply(&self, notification: Notification) -> Notification {
        let notification = notification.with("statute", &self.statute);
        match self.max_allowed_days {
            Some(days) => notification.with("max_allowed_days", days),
            None => notification,
        }
    }
}

fn stay_notification(stay: &Stay, recipient: &str, kind: NotificationKind) -> Notification {
    Notification::new(recipient, kind)
        .with("stay_id", &stay.stay_id)
        .with("property_id", &stay.property_id)
        .with("region_code", &stay.region_code)
        .with("start_date", stay.start_date)
        .with("end_date", stay.end_date)
}

fn record_failure(report: &mut SweepReport, stay_id: &StayId, pass: SweepPass, err: UnitError) {
    error!(stay_id = %stay_id, ?pass, error = %err, "aborted unit of work; next sweep will retry");
    report.failures.push(UnitFailure {
        stay_id: stay_id.clone(),
        pass,
        error: err.to_string(),
    });
}

pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Saturates at the calendar bounds instead of overflowing.
fn days_after(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}
