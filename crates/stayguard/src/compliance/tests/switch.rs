use chrono::Duration;

use super::common::*;
use crate::compliance::domain::{OwnerId, PropertyId, StayId, TokenState};
use crate::compliance::engine::{SweepPass, SweepPolicy};
use crate::compliance::ledger::{AuditLedger, LedgerEvent, NewAuditEntry};
use crate::compliance::notifier::NotificationKind;

#[test]
fn pre_end_notice_fires_once_two_days_out() {
    let harness = harness(vec![stay("stay-1", days_from_today(2))]);

    let first = harness.engine.run_sweep(now()).expect("sweep runs");
    assert_eq!(first.pre_end_notices, 1);
    let notices = harness.notifier.sent_of(NotificationKind::LeaseEndingSoon);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].recipient, OWNER_EMAIL);
    assert_eq!(notices[0].context["hours_remaining"], "48");

    let second = harness
        .engine
        .run_sweep(now() + Duration::hours(1))
        .expect("sweep runs");
    assert_eq!(second.pre_end_notices, 0);
    assert_eq!(harness.ledger.count(LedgerEvent::PreEndNotice), 1);
    assert_eq!(
        harness.notifier.sent_of(NotificationKind::LeaseEndingSoon).len(),
        1
    );
}

#[test]
fn last_day_shields_property_and_sends_urgent_notice() {
    let harness = harness(vec![stay("stay-1", today())]);

    let first = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(first.last_day_shields, 1);
    assert_eq!(first.urgent_notices, 1);
    assert!(harness.property("prop-1").shield_mode_enabled);
    assert_eq!(harness.ledger.count(LedgerEvent::UrgentToday), 1);
    assert_eq!(harness.ledger.count(LedgerEvent::LastDayShield), 1);

    let shield_entry = harness
        .ledger
        .entries()
        .into_iter()
        .find(|entry| entry.event == LedgerEvent::LastDayShield)
        .expect("shield entry");
    assert_eq!(shield_entry.property_id, Some(PropertyId("prop-1".to_string())));
    assert_eq!(shield_entry.stay_id, Some(StayId("stay-1".to_string())));

    let shield_notices = harness
        .notifier
        .sent_of(NotificationKind::ShieldModeActivated);
    assert_eq!(shield_notices.len(), 1);
    assert_eq!(shield_notices[0].context["reason"], "last_day_of_stay");
    assert_eq!(
        harness.notifier.sent_of(NotificationKind::LeaseEndsToday).len(),
        1
    );

    let second = harness
        .engine
        .run_sweep(now() + Duration::hours(3))
        .expect("sweep runs");
    assert_eq!(second.switch_transitions(), 0);
    assert_eq!(harness.ledger.count(LedgerEvent::UrgentToday), 1);
    assert_eq!(harness.ledger.count(LedgerEvent::LastDayShield), 1);
}

#[test]
fn last_day_shield_is_keyed_by_property() {
    let mut second_guest = stay("stay-2", today());
    second_guest.guest_email = "second@example.com".to_string();
    let harness = harness(vec![stay("stay-1", today()), second_guest]);

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.last_day_shields, 1);
    assert_eq!(report.urgent_notices, 2);
    assert_eq!(harness.ledger.count(LedgerEvent::LastDayShield), 1);
}

#[test]
fn last_day_shield_skips_property_already_shielded() {
    let mut shielded = property("prop-1");
    shielded.shield_mode_enabled = true;
    let harness = harness_with(
        vec![shielded],
        vec![stay("stay-1", today())],
        SweepPolicy::default(),
    );

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.last_day_shields, 0);
    assert_eq!(report.urgent_notices, 1);
    assert_eq!(harness.ledger.count(LedgerEvent::LastDayShield), 0);
    assert!(harness
        .notifier
        .sent_of(NotificationKind::ShieldModeActivated)
        .is_empty());
}

#[test]
fn owner_deactivation_holds_for_the_rest_of_the_day() {
    let harness = harness(vec![stay("stay-1", today())]);
    harness.engine.run_sweep(now()).expect("sweep runs");

    harness
        .stays
        .deactivate_shield_mode(
            &PropertyId("prop-1".to_string()),
            &OwnerId("owner-1".to_string()),
            now() + Duration::hours(1),
        )
        .expect("owner clears shield");

    let report = harness
        .engine
        .run_sweep(now() + Duration::hours(2))
        .expect("sweep runs");

    assert_eq!(report.last_day_shields, 0);
    assert!(!harness.property("prop-1").shield_mode_enabled);
    assert_eq!(harness.ledger.count(LedgerEvent::LastDayShield), 1);
    assert_eq!(harness.ledger.count(LedgerEvent::ShieldDeactivated), 1);
}

#[test]
fn auto_execution_vacates_stay_and_locks_property() {
    let harness = harness(vec![stay("stay-1", days_from_today(-3))]);

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.auto_executions, 1);
    let stay = harness.stay("stay-1");
    assert_eq!(stay.checked_out_at, Some(now()));
    assert_eq!(stay.dead_mans_switch_triggered_at, Some(now()));
    let property = harness.property("prop-1");
    assert_eq!(property.usat_token_state, TokenState::Staged);
    assert!(property.shield_mode_enabled);

    assert_eq!(harness.ledger.count(LedgerEvent::AutoExecuted), 1);
    let entry = harness
        .ledger
        .entries()
        .into_iter()
        .find(|entry| entry.event == LedgerEvent::AutoExecuted)
        .expect("auto-execution recorded");
    let meta = entry.meta.expect("meta recorded");
    assert_eq!(meta["utility_lock"], true);
    assert_eq!(meta["trespass_detection"], true);
    assert_eq!(meta["token_revoked"], true);
    assert_eq!(meta["days_overdue"], 3);

    assert_eq!(
        harness.notifier.sent_of(NotificationKind::AutoExecuted).len(),
        1
    );
    let shield_notices = harness
        .notifier
        .sent_of(NotificationKind::ShieldModeActivated);
    assert_eq!(shield_notices.len(), 1);
    assert_eq!(shield_notices[0].context["reason"], "auto_execution");
}

#[test]
fn auto_execution_never_repeats() {
    let harness = harness(vec![stay("stay-1", days_from_today(-3))]);
    harness.engine.run_sweep(now()).expect("sweep runs");

    for day in 1..4 {
        let report = harness
            .engine
            .run_sweep(now() + Duration::days(day))
            .expect("sweep runs");
        assert_eq!(report.auto_executions, 0);
        assert_eq!(report.repaired_auto_executions, 0);
    }

    let stay = harness.stay("stay-1");
    assert_eq!(stay.checked_out_at, Some(now()));
    assert_eq!(harness.ledger.count(LedgerEvent::AutoExecuted), 1);
}

#[test]
fn grace_period_boundary() {
    let harness = harness(vec![
        stay("one-day-over", days_from_today(-1)),
        stay("two-days-over", days_from_today(-2)),
    ]);

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.auto_executions, 1);
    assert!(harness.stay("one-day-over").is_active());
    assert!(harness.stay("two-days-over").has_triggered());
}

#[test]
fn triggered_stay_is_never_touched_again() {
    let mut triggered = stay("stay-1", days_from_today(-5));
    triggered.dead_mans_switch_triggered_at = Some(now() - Duration::days(2));
    let harness = harness(vec![triggered]);

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.auto_executions, 0);
    let stay = harness.stay("stay-1");
    assert!(stay.checked_out_at.is_none());
    assert_eq!(
        stay.dead_mans_switch_triggered_at,
        Some(now() - Duration::days(2))
    );
    assert_eq!(harness.ledger.count(LedgerEvent::AutoExecuted), 0);
}

#[test]
fn disabled_switch_only_gets_the_last_day_shield() {
    let harness = harness(vec![
        stay_without_switch("ends-today", today()),
        stay_without_switch("ends-soon", days_from_today(2)),
        stay_without_switch("overdue", days_from_today(-3)),
    ]);

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.last_day_shields, 1);
    assert_eq!(report.urgent_notices, 0);
    assert_eq!(report.pre_end_notices, 0);
    assert_eq!(report.auto_executions, 0);
    assert!(harness.stay("overdue").is_active());
    assert_eq!(
        harness.property("prop-1").usat_token_state,
        TokenState::Released
    );
}

#[test]
fn silenced_alerts_skip_notice_stages_but_not_enforcement() {
    let mut quiet_notice = stay("quiet-notice", days_from_today(2));
    quiet_notice.dead_mans_switch.alert_email = false;
    let mut quiet_last_day = stay("quiet-last-day", today());
    quiet_last_day.dead_mans_switch.alert_email = false;
    let mut quiet_overdue = stay("quiet-overdue", days_from_today(-3));
    quiet_overdue.dead_mans_switch.alert_email = false;
    let harness = harness(vec![quiet_notice, quiet_last_day, quiet_overdue]);

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.pre_end_notices, 0);
    assert_eq!(report.urgent_notices, 0);
    assert_eq!(report.last_day_shields, 1);
    assert_eq!(report.auto_executions, 1);
    assert_eq!(harness.ledger.count(LedgerEvent::PreEndNotice), 0);
    assert_eq!(harness.ledger.count(LedgerEvent::UrgentToday), 0);
    assert_eq!(harness.ledger.count(LedgerEvent::AutoExecuted), 1);
    assert!(harness.stay("quiet-overdue").has_triggered());

    assert!(harness
        .notifier
        .sent_of(NotificationKind::LeaseEndingSoon)
        .is_empty());
    assert!(harness
        .notifier
        .sent_of(NotificationKind::AutoExecuted)
        .is_empty());
    // Only the last-day shield notice, which is not gated.
    assert_eq!(
        harness
            .notifier
            .sent_of(NotificationKind::ShieldModeActivated)
            .len(),
        1
    );
}

#[test]
fn offsets_follow_policy() {
    let policy = SweepPolicy {
        notice_days: 3,
        grace_days: 1,
        ..SweepPolicy::default()
    };
    let harness = harness_with(
        vec![property("prop-1")],
        vec![
            stay("three-days-out", days_from_today(3)),
            stay("two-days-out", days_from_today(2)),
            stay("one-day-over", days_from_today(-1)),
        ],
        policy,
    );

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.pre_end_notices, 1);
    assert_eq!(
        harness
            .ledger
            .count_for_stay(LedgerEvent::PreEndNotice, "three-days-out"),
        1
    );
    assert_eq!(report.auto_executions, 1);
    assert!(harness.stay("one-day-over").has_triggered());
}

#[test]
fn recorded_execution_with_lost_stay_write_is_repaired_silently() {
    let overdue = stay("stay-1", days_from_today(-3));
    let harness = harness(vec![overdue.clone()]);
    harness
        .ledger
        .append(NewAuditEntry::for_stay(
            LedgerEvent::AutoExecuted,
            &overdue,
            "auto-executed before the stay write was lost",
            now() - Duration::days(1),
        ))
        .expect("seed entry");

    let report = harness.engine.run_sweep(now()).expect("sweep runs");

    assert_eq!(report.auto_executions, 0);
    assert_eq!(report.repaired_auto_executions, 1);
    let stay = harness.stay("stay-1");
    assert!(!stay.is_active());
    assert!(stay.has_triggered());
    assert_eq!(harness.ledger.count(LedgerEvent::AutoExecuted), 1);
    assert!(harness
        .notifier
        .sent_of(NotificationKind::AutoExecuted)
        .is_empty());
}

#[test]
fn actuation_survives_a_failed_append_and_is_not_repeated() {
    let harness = harness(vec![stay("stay-1", days_from_today(-3))]);
    harness.ledger.fail_appends(true);

    let failed = harness.engine.run_sweep(now()).expect("sweep completes");

    assert!(failed
        .failures
        .iter()
        .any(|failure| failure.pass == SweepPass::AutoExecute));
    let property = harness.property("prop-1");
    assert!(property.shield_mode_enabled);
    assert_eq!(property.usat_token_state, TokenState::Staged);
    let stay = harness.stay("stay-1");
    assert!(stay.is_active());
    assert!(!stay.has_triggered());

    harness.ledger.fail_appends(false);
    let retried = harness
        .engine
        .run_sweep(now() + Duration::hours(1))
        .expect("sweep runs");

    assert_eq!(retried.auto_executions, 1);
    assert!(harness.stay("stay-1").has_triggered());
    let entry = harness
        .ledger
        .entries()
        .into_iter()
        .find(|entry| entry.event == LedgerEvent::AutoExecuted)
        .expect("auto-execution recorded");
    let meta = entry.meta.expect("meta recorded");
    assert_eq!(meta["token_revoked"], false);
    assert_eq!(meta["shield_activated"], false);
}
