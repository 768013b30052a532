use chrono::{DateTime, Utc};
use serde_json::json;

use super::{
    days_after, record_failure, start_of_day, stay_notification, ComplianceEngine, SweepError,
    SweepPass, SweepReport, UnitError,
};
use crate::compliance::domain::Stay;
use crate::compliance::ledger::{AuditLedger, LedgerEvent, NewAuditEntry};
use crate::compliance::notifier::{NotificationKind, Notifier};
use crate::compliance::repository::StayRepository;

impl<R, L, N> ComplianceEngine<R, L, N>
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    /// Pass A: warn owner and guest about stays ending inside the warning window.
    pub(super) fn warn_approaching_limits(
        &self,
        active: &[Stay],
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let today = report.today;
        let horizon = days_after(today, self.policy.warning_window_days);

        for stay in active
            .iter()
            .filter(|stay| stay.end_date >= today && stay.end_date <= horizon)
        {
            match self.warn_stay(stay, now, report) {
                Ok(true) => report.limit_warnings += 1,
                Ok(false) => {}
                Err(err) => record_failure(report, &stay.stay_id, SweepPass::ApproachingLimit, err),
            }
        }
    }

    fn warn_stay(
        &self,
        stay: &Stay,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<bool, UnitError> {
        let dedupe = self.policy.dedupe_warnings;
        if dedupe
            && self.ledger.exists_for_stay(
                LedgerEvent::ApproachingLimit,
                &stay.stay_id,
                Some(start_of_day(report.today)),
            )?
        {
            return Ok(false);
        }

        let limit = self.limit_context(stay, report);
        let days_remaining = (stay.end_date - report.today).num_days();
        let message = format!(
            "Stay {} ends on {} ({} day(s) remaining) under {}",
            stay.stay_id, stay.end_date, days_remaining, limit.statute
        );

        for recipient in [&stay.owner_email, &stay.guest_email] {
            let notification = limit.apply(
                stay_notification(stay, recipient, NotificationKind::StayLimitApproaching)
                    .with("days_remaining", days_remaining),
            );
            self.notify(notification, report);
        }

        if dedupe {
            self.ledger.append(
                NewAuditEntry::for_stay(LedgerEvent::ApproachingLimit, stay, message, now)
                    .with_meta(json!({
                        "end_date": stay.end_date,
                        "days_remaining": days_remaining,
                        "statute": limit.statute,
                    })),
            )?;
        }

        Ok(true)
    }

    /// Pass B: record each overstay exactly once, however long it persists.
    pub(super) fn detect_overstays(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        let overdue = self.repository.list_stays_ending_before(report.today)?;

        for stay in &overdue {
            match self.record_overstay(stay, now, report) {
                Ok(true) => report.overstays += 1,
                Ok(false) => {}
                Err(err) => record_failure(report, &stay.stay_id, SweepPass::Overstay, err),
            }
        }

        Ok(())
    }

    fn record_overstay(
        &self,
        stay: &Stay,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<bool, UnitError> {
        if self
            .ledger
            .exists_for_stay(LedgerEvent::Overstay, &stay.stay_id, None)?
        {
            return Ok(false);
        }

        let limit = self.limit_context(stay, report);
        let days_over = (report.today - stay.end_date).num_days();
        let message = format!(
            "Guest remained {} day(s) past the {} end date of stay {} ({})",
            days_over, stay.end_date, stay.stay_id, limit.statute
        );

        for recipient in [&stay.owner_email, &stay.guest_email] {
            let notification = limit.apply(
                stay_notification(stay, recipient, NotificationKind::OverstayDetected)
                    .with("days_over", days_over),
            );
            self.notify(notification, report);
        }

        self.ledger.append(
            NewAuditEntry::for_stay(LedgerEvent::Overstay, stay, message, now).with_meta(json!({
                "end_date": stay.end_date,
                "days_over": days_over,
                "region_code": stay.region_code,
                "max_allowed_days": limit.max_allowed_days,
            })),
        )?;

        Ok(true)
    }
}
