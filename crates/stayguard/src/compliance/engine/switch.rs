//! Dead Man's Switch stages.
//!
//! | stage | fires when | keyed by |
//! |---|---|---|
//! | pre-end notice | `end_date == today + notice_days` | stay |
//! | last-day shield | `end_date == today`, shield off | property, per day |
//! | urgent today | `end_date == today` | stay |
//! | auto-execute | `end_date <= today - grace_days`, not yet triggered | stay |
//!
//! The date predicates are mutually exclusive per stay, except the property-keyed
//! last-day shield which can fire alongside the urgent notice.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{
    days_after, days_before, record_failure, start_of_day, stay_notification, ComplianceEngine,
    SweepError, SweepPass, SweepReport, UnitError,
};
use crate::compliance::domain::Stay;
use crate::compliance::ledger::{AuditLedger, LedgerEvent, NewAuditEntry};
use crate::compliance::notifier::{NotificationKind, Notifier};
use crate::compliance::repository::{RepositoryError, StayRepository};

enum AutoExecution {
    Executed,
    Repaired,
    Skipped,
}

impl<R, L, N> ComplianceEngine<R, L, N>
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    /// Pass C.
    pub(super) fn advance_dead_mans_switch(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        let today = report.today;

        let notice_day = days_after(today, self.policy.notice_days);
        for stay in self.repository.list_stays_ending_on(notice_day)? {
            if !stay.switch_alerts_enabled() {
                continue;
            }
            match self.send_pre_end_notice(&stay, now, report) {
                Ok(true) => report.pre_end_notices += 1,
                Ok(false) => {}
                Err(err) => record_failure(report, &stay.stay_id, SweepPass::PreEndNotice, err),
            }
        }

        for stay in self.repository.list_stays_ending_on(today)? {
            match self.shield_last_day(&stay, now, report) {
                Ok(true) => report.last_day_shields += 1,
                Ok(false) => {}
                Err(err) => record_failure(report, &stay.stay_id, SweepPass::LastDayShield, err),
            }

            if !stay.switch_alerts_enabled() {
                continue;
            }
            match self.send_urgent_notice(&stay, now, report) {
                Ok(true) => report.urgent_notices += 1,
                Ok(false) => {}
                Err(err) => record_failure(report, &stay.stay_id, SweepPass::UrgentToday, err),
            }
        }

        // end_date <= today - grace_days
        let first_safe_day = days_after(days_before(today, self.policy.grace_days), 1);
        for stay in self.repository.list_stays_ending_before(first_safe_day)? {
            if !stay.switch_enabled() {
                continue;
            }
            let stay_id = stay.stay_id.clone();
            match self.auto_execute(stay, now, report) {
                Ok(AutoExecution::Executed) => report.auto_executions += 1,
                Ok(AutoExecution::Repaired) => report.repaired_auto_executions += 1,
                Ok(AutoExecution::Skipped) => {}
                Err(err) => record_failure(report, &stay_id, SweepPass::AutoExecute, err),
            }
        }

        Ok(())
    }

    fn send_pre_end_notice(
        &self,
        stay: &Stay,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<bool, UnitError> {
        if self
            .ledger
            .exists_for_stay(LedgerEvent::PreEndNotice, &stay.stay_id, None)?
        {
            return Ok(false);
        }

        let hours = u64::from(self.policy.notice_days) * 24;
        let message = format!(
            "Stay {} ends on {} ({}h). Confirm the guest's departure or extend the stay before automatic enforcement.",
            stay.stay_id, stay.end_date, hours
        );

        self.notify(
            stay_notification(stay, &stay.owner_email, NotificationKind::LeaseEndingSoon)
                .with("hours_remaining", hours),
            report,
        );

        self.ledger
            .append(NewAuditEntry::for_stay(LedgerEvent::PreEndNotice, stay, message, now))?;
        Ok(true)
    }

    /// Keyed by property: one activation per property per day, and never while the shield is
    /// already on. A shield the owner switched off today stays off until tomorrow's sweep.
    fn shield_last_day(
        &self,
        stay: &Stay,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<bool, UnitError> {
        let property = self
            .repository
            .get_property(&stay.property_id)?
            .ok_or(RepositoryError::NotFound)?;
        if property.shield_mode_enabled {
            return Ok(false);
        }
        if self.ledger.exists_for_property(
            LedgerEvent::LastDayShield,
            &property.property_id,
            Some(start_of_day(report.today)),
        )? {
            return Ok(false);
        }

        self.actuator.activate_shield_mode(&property.property_id)?;
        let message = format!(
            "Shield Mode enabled for {} on the final day of stay {}",
            property.display_name(),
            stay.stay_id
        );
        self.ledger.append(
            NewAuditEntry::for_property(
                LedgerEvent::LastDayShield,
                &property.property_id,
                message,
                now,
            )
            .with_stay(&stay.stay_id)
            .with_meta(json!({ "end_date": stay.end_date })),
        )?;

        self.notify(
            stay_notification(stay, &stay.owner_email, NotificationKind::ShieldModeActivated)
                .with("reason", "last_day_of_stay")
                .with("property_name", property.display_name()),
            report,
        );
        info!(property_id = %property.property_id, stay_id = %stay.stay_id, "last-day Shield Mode activated");
        Ok(true)
    }

    fn send_urgent_notice(
        &self,
        stay: &Stay,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<bool, UnitError> {
        if self
            .ledger
            .exists_for_stay(LedgerEvent::UrgentToday, &stay.stay_id, None)?
        {
            return Ok(false);
        }

        let message = format!(
            "Stay {} ends today ({}). Automatic enforcement follows in {} day(s) without owner action.",
            stay.stay_id, stay.end_date, self.policy.grace_days
        );

        self.notify(
            stay_notification(stay, &stay.owner_email, NotificationKind::LeaseEndsToday)
                .with("grace_days", self.policy.grace_days),
            report,
        );

        self.ledger
            .append(NewAuditEntry::for_stay(LedgerEvent::UrgentToday, stay, message, now))?;
        Ok(true)
    }

    /// Actuation is idempotent and happens before the ledger append. If the entry exists but
    /// the stay was never marked (write lost after the append), the stay is completed
    /// silently instead of firing again.
    fn auto_execute(
        &self,
        mut stay: Stay,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<AutoExecution, UnitError> {
        if stay.has_triggered() {
            return Ok(AutoExecution::Skipped);
        }

        if self
            .ledger
            .exists_for_stay(LedgerEvent::AutoExecuted, &stay.stay_id, None)?
        {
            self.actuator.mark_vacated(&mut stay, now)?;
            warn!(
                stay_id = %stay.stay_id,
                "auto-execution already recorded but stay was still active; completed without re-notifying"
            );
            return Ok(AutoExecution::Repaired);
        }

        let lockdown = self.actuator.lock_down(&stay.property_id)?;
        let days_overdue = (report.today - stay.end_date).num_days();
        let message = format!(
            "Dead Man's Switch auto-executed for stay {}: {} day(s) past the {} end date without owner action. Occupancy marked vacant, utility lock and trespass detection activated, Shield Mode enabled.",
            stay.stay_id, days_overdue, stay.end_date
        );

        self.ledger.append(
            NewAuditEntry::for_stay(LedgerEvent::AutoExecuted, &stay, message, now).with_meta(
                json!({
                    "end_date": stay.end_date,
                    "days_overdue": days_overdue,
                    "utility_lock": true,
                    "trespass_detection": true,
                    "token_revoked": lockdown.token_revoked,
                    "shield_activated": lockdown.shield_activated,
                }),
            ),
        )?;

        self.actuator.mark_vacated(&mut stay, now)?;

        if stay.switch_alerts_enabled() {
            self.notify(
                stay_notification(&stay, &stay.owner_email, NotificationKind::AutoExecuted)
                    .with("days_overdue", days_overdue),
                report,
            );
            self.notify(
                stay_notification(&stay, &stay.owner_email, NotificationKind::ShieldModeActivated)
                    .with("reason", "auto_execution"),
                report,
            );
        }

        info!(
            stay_id = %stay.stay_id,
            property_id = %stay.property_id,
            token_revoked = lockdown.token_revoked,
            "dead man's switch auto-executed"
        );
        Ok(AutoExecution::Executed)
    }
}
