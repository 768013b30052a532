use crate::demo::{run_demo, DemoArgs};
use crate::infra::{build_resolver, load_snapshot, Runtime};
use crate::server;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stayguard::compliance::{stay_duration_days, SweepReport};
use stayguard::config::AppConfig;
use stayguard::error::AppError;
use stayguard::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "StayGuard",
    about = "Classify guest stays against regional limits and run the compliance sweep",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and the periodic sweep (default command)
    Serve(ServeArgs),
    /// Run one compliance sweep over a JSON store snapshot
    Sweep(SweepArgs),
    /// Classify a stay duration for a region
    Resolve(ResolveArgs),
    /// Run a seeded scenario twice to show each stage firing exactly once
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON snapshot to load at startup; every change is written back to it
    #[arg(long)]
    pub(crate) snapshot: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct SweepArgs {
    /// JSON snapshot holding properties, stays and the ledger
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Clock override (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, alias = "today", value_parser = crate::infra::parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Leave the snapshot untouched after the sweep
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Print the sweep report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ResolveArgs {
    /// Region code, e.g. NYC or CA
    pub(crate) region: String,
    /// Stay length in days; required unless --start and --end are given
    #[arg(long)]
    pub(crate) days: Option<i64>,
    /// First day of the stay (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date, requires = "end")]
    pub(crate) start: Option<NaiveDate>,
    /// Last day of the stay (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date, requires = "start")]
    pub(crate) end: Option<NaiveDate>,
    /// The owner lives in the dwelling with the guest
    #[arg(long)]
    pub(crate) owner_occupied: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sweep(args) => run_sweep(args),
        Command::Resolve(args) => run_resolve(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let snapshot = load_snapshot(Some(&args.snapshot))?;
    let persist_to = (!args.dry_run).then(|| args.snapshot.clone());
    let runtime = Runtime::build(&config, snapshot, persist_to)?;
    let now = args.now.unwrap_or_else(Utc::now);

    let report = runtime.engine.run_sweep(now)?;
    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Sweep report unavailable: {err}"),
        }
    } else {
        render_sweep_report(&report);
    }
    Ok(())
}

fn run_resolve(args: ResolveArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let resolver = build_resolver(&config)?;

    let days = match (args.start, args.end, args.days) {
        (Some(start), Some(end), _) => stay_duration_days(start, end),
        (_, _, Some(days)) => days,
        _ => {
            println!("Provide --days or both --start and --end");
            return Ok(());
        }
    };

    let result = resolver.resolve(&args.region, days, args.owner_occupied)?;
    println!(
        "{}: {} day(s) -> {} (limit {} days, {} risk)",
        result.region_code,
        result.stay_duration_days,
        result.classification.label(),
        result.max_allowed_days,
        result.risk_level.label()
    );
    if result.owner_occupied_exception {
        println!("Owner-occupied exception applied");
    }
    for statute in &result.statutes {
        println!("- {statute}");
    }
    if let Some(explanation) = &result.explanation {
        println!("{explanation}");
    }
    match &result.message {
        Some(message) => println!("EXCEEDS LIMIT: {message}"),
        None => println!("Within limit"),
    }
    Ok(())
}

pub(crate) fn render_sweep_report(report: &SweepReport) {
    println!(
        "Compliance sweep for {} ({} active stay(s))",
        report.today, report.active_stays
    );
    println!("- Approaching-limit warnings: {}", report.limit_warnings);
    println!("- Overstays recorded: {}", report.overstays);
    println!(
        "- Dead Man's Switch: {} pre-end notice(s), {} last-day shield(s), {} urgent notice(s), {} auto-execution(s)",
        report.pre_end_notices, report.last_day_shields, report.urgent_notices, report.auto_executions
    );
    if report.repaired_auto_executions > 0 {
        println!(
            "- Completed {} previously recorded auto-execution(s)",
            report.repaired_auto_executions
        );
    }
    println!(
        "- Notifications: {} sent, {} failed",
        report.notifications_sent, report.notification_failures
    );
    if !report.unknown_regions.is_empty() {
        let ids: Vec<_> = report.unknown_regions.iter().map(|id| id.0.as_str()).collect();
        println!("- Stays without a jurisdiction rule: {}", ids.join(", "));
    }
    for failure in &report.failures {
        println!(
            "  ! {} ({:?}) will be retried: {}",
            failure.stay_id, failure.pass, failure.error
        );
    }
}
