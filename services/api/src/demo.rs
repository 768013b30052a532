use crate::cli::render_sweep_report;
use crate::infra::Runtime;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use stayguard::compliance::{
    DeadMansSwitch, GuestId, OwnerId, Property, PropertyId, Stay, StayId, StayRegistration,
    StoreSnapshot, TokenState,
};
use stayguard::config::AppConfig;
use stayguard::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Sweep date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Skip the audit ledger listing at the end of the demo.
    #[arg(long)]
    pub(crate) skip_ledger: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
    let now = demo_clock(today);

    println!("Stay compliance demo ({today})");
    let runtime = Runtime::build(&config, seeded_snapshot(today), None)?;

    println!("\nStay intake");
    let accepted = runtime
        .stays
        .register(demo_registration(today, "CA", 14), now);
    match accepted {
        Ok(registered) => println!(
            "- Registered {} in {} as {} (limit {} days)",
            registered.stay.stay_id,
            registered.stay.region_code,
            registered.classification.classification.label(),
            registered.classification.max_allowed_days
        ),
        Err(err) => println!("- Registration rejected: {err}"),
    }
    for (region, days) in [("NYC", 45), ("ZZ", 5)] {
        match runtime
            .stays
            .register(demo_registration(today, region, days), now)
        {
            Ok(registered) => println!("- Unexpectedly registered {}", registered.stay.stay_id),
            Err(err) => println!("- {region} stay of {days} day(s) rejected: {err}"),
        }
    }

    for pass in 1..=2 {
        println!("\nSweep #{pass}");
        let report = runtime.engine.run_sweep(now)?;
        render_sweep_report(&report);
    }

    let state = runtime.store.snapshot()?;

    println!("\nProperty state after enforcement");
    for property in &state.properties {
        println!(
            "- {}: token {}, Shield Mode {}",
            property.display_name(),
            property.usat_token_state.label(),
            if property.shield_mode_enabled { "on" } else { "off" }
        );
    }

    if args.skip_ledger {
        return Ok(());
    }

    println!("\nAudit ledger");
    for entry in &state.ledger {
        let subject = entry
            .stay_id
            .as_ref()
            .map(|id| id.0.as_str())
            .or_else(|| entry.property_id.as_ref().map(|id| id.0.as_str()))
            .unwrap_or_default();
        println!("  #{:<3} {:<42} {}", entry.id.0, entry.title, subject);
    }

    Ok(())
}

fn demo_clock(today: NaiveDate) -> DateTime<Utc> {
    today
        .and_hms_opt(9, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

fn seeded_snapshot(today: NaiveDate) -> StoreSnapshot {
    let properties = vec![
        demo_property("harbor-loft", "Harbor Loft"),
        demo_property("maple-cottage", "Maple Cottage"),
        demo_property("cedar-suite", "Cedar Suite"),
    ];

    let stays = vec![
        demo_stay("stay-warning", "cedar-suite", "NYC", today, 4, false),
        demo_stay("stay-48h", "cedar-suite", "CA", today, 2, true),
        demo_stay("stay-last-day", "maple-cottage", "FL", today, 0, true),
        demo_stay("stay-overdue", "harbor-loft", "TX", today, -3, true),
        demo_stay("stay-unmapped", "cedar-suite", "ZZ", today, 1, false),
    ];

    StoreSnapshot {
        properties,
        stays,
        ledger: Vec::new(),
    }
}

fn demo_property(id: &str, name: &str) -> Property {
    Property {
        property_id: PropertyId(id.to_string()),
        owner_id: OwnerId("owner-demo".to_string()),
        name: name.to_string(),
        usat_token_state: TokenState::Released,
        shield_mode_enabled: false,
    }
}

fn demo_stay(
    id: &str,
    property: &str,
    region: &str,
    today: NaiveDate,
    ends_in_days: i64,
    switch: bool,
) -> Stay {
    let end_date = today + Duration::days(ends_in_days);
    Stay {
        stay_id: StayId(id.to_string()),
        guest_id: GuestId(format!("guest-{id}")),
        owner_id: OwnerId("owner-demo".to_string()),
        property_id: PropertyId(property.to_string()),
        guest_email: format!("{id}@guests.example"),
        owner_email: "owner@stayguard.example".to_string(),
        region_code: region.to_string(),
        start_date: end_date - Duration::days(14),
        end_date,
        owner_occupied: false,
        invitation_id: None,
        checked_out_at: None,
        cancelled_at: None,
        dead_mans_switch: DeadMansSwitch {
            enabled: switch,
            alert_email: switch,
        },
        dead_mans_switch_triggered_at: None,
    }
}

fn demo_registration(today: NaiveDate, region: &str, days: i64) -> StayRegistration {
    let start_date = today + Duration::days(7);
    StayRegistration {
        guest_id: GuestId("guest-walkin".to_string()),
        owner_id: OwnerId("owner-demo".to_string()),
        property_id: PropertyId("cedar-suite".to_string()),
        guest_email: "walkin@guests.example".to_string(),
        owner_email: "owner@stayguard.example".to_string(),
        region_code: region.to_string(),
        start_date,
        end_date: start_date + Duration::days(days),
        owner_occupied: false,
        invitation_id: None,
        dead_mans_switch: DeadMansSwitch {
            enabled: true,
            alert_email: true,
        },
    }
}
