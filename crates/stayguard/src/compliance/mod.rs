pub mod actuator;
pub mod domain;
pub mod engine;
pub mod jurisdiction;
pub mod ledger;
pub mod memory;
pub mod notifier;
pub mod repository;
pub mod router;
pub mod stays;

#[cfg(test)]
mod tests;

pub use actuator::{EnforcementActuator, LockdownOutcome};
pub use domain::{
    stay_duration_days, DeadMansSwitch, GuestId, InvitationId, OwnerId, Property, PropertyId,
    Stay, StayId, TokenState,
};
pub use engine::{
    ComplianceEngine, SweepError, SweepPass, SweepPolicy, SweepReport, UnitFailure,
};
pub use jurisdiction::{
    ClassificationResult, ComplianceStatus, JurisdictionResolver, RegionRule, ResolveError,
    RiskLevel, RuleImportError, RuleTable, StayClassification, DEFAULT_EXTENDED_STAY_DAYS,
};
pub use ledger::{
    Actor, AuditCategory, AuditLedger, AuditLogEntry, EntryId, LedgerError, LedgerEvent,
    NewAuditEntry,
};
pub use memory::{
    InMemoryAuditLedger, InMemoryStayRepository, SnapshotError, SnapshotStore, StoreSnapshot,
};
pub use notifier::{Notification, NotificationKind, Notifier, NotifyError};
pub use repository::{RepositoryError, StayRepository};
pub use router::{compliance_router, ComplianceServices};
pub use stays::{RegisteredStay, StayRegistration, StayService, StayServiceError};
