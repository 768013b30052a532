use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use stayguard::compliance::{
    ComplianceEngine, JurisdictionResolver, Notification, Notifier, NotifyError, RuleTable,
    SnapshotStore, StayService, StoreSnapshot, SweepPolicy,
};
use stayguard::config::AppConfig;
use stayguard::error::AppError;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Delivery adapter that writes each notification to the log instead of a mail relay.
#[derive(Debug, Default, Clone)]
pub(crate) struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotifyError::Rejected(notification.recipient.clone()));
        }
        info!(
            recipient = %notification.recipient,
            template = notification.kind.template(),
            context = ?notification.context,
            "notification dispatched"
        );
        Ok(())
    }
}

pub(crate) type ServiceEngine = ComplianceEngine<SnapshotStore, SnapshotStore, TracingNotifier>;
pub(crate) type ServiceStays = StayService<SnapshotStore, SnapshotStore>;

/// Store and services shared by the CLI commands and the HTTP server.
pub(crate) struct Runtime {
    pub(crate) store: Arc<SnapshotStore>,
    pub(crate) engine: Arc<ServiceEngine>,
    pub(crate) stays: Arc<ServiceStays>,
}

impl Runtime {
    /// With `persist_to` set, every committed change is written through to that file.
    pub(crate) fn build(
        config: &AppConfig,
        snapshot: StoreSnapshot,
        persist_to: Option<PathBuf>,
    ) -> Result<Self, AppError> {
        let resolver = Arc::new(build_resolver(config)?);
        if let Some(path) = &persist_to {
            info!(path = %path.display(), "store writes through to snapshot");
        }
        let store = Arc::new(SnapshotStore::new(snapshot, persist_to));

        let engine = Arc::new(ComplianceEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(TracingNotifier),
            resolver.clone(),
            SweepPolicy::from(&config.sweep),
        ));
        let stays = Arc::new(StayService::new(store.clone(), store.clone(), resolver));

        Ok(Self {
            store,
            engine,
            stays,
        })
    }
}

pub(crate) fn build_resolver(config: &AppConfig) -> Result<JurisdictionResolver, AppError> {
    let table = match &config.rules.csv_path {
        Some(path) => {
            let table = RuleTable::from_path(path)?;
            info!(path = %path.display(), regions = table.len(), "jurisdiction rules imported");
            table
        }
        None => RuleTable::standard(),
    };
    Ok(JurisdictionResolver::new(table).with_extended_stay_days(config.rules.extended_stay_days))
}

/// A missing snapshot file starts from an empty store.
pub(crate) fn load_snapshot(path: Option<&PathBuf>) -> Result<StoreSnapshot, AppError> {
    match path {
        Some(path) if path.exists() => Ok(StoreSnapshot::from_path(path)?),
        _ => Ok(StoreSnapshot::default()),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Accepts RFC 3339 timestamps or a bare date (read as midnight UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    parse_date(trimmed)
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| format!("failed to parse '{raw}' as an RFC 3339 timestamp or YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_timestamps_and_bare_dates() {
        let expected = Utc
            .with_ymd_and_hms(2025, 6, 15, 9, 30, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(
            parse_timestamp("2025-06-15T11:30:00+02:00").expect("rfc3339"),
            expected
        );
        assert_eq!(
            parse_timestamp("2025-06-15").expect("date"),
            Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0)
                .single()
                .expect("valid timestamp")
        );
        assert!(parse_timestamp("next tuesday").is_err());
    }

    #[test]
    fn tracing_notifier_rejects_blank_recipients() {
        let notifier = TracingNotifier;
        let blank = Notification::new(
            "  ",
            stayguard::compliance::NotificationKind::OverstayDetected,
        );
        assert!(matches!(
            notifier.notify(&blank),
            Err(NotifyError::Rejected(_))
        ));
    }
}
